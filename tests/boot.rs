//! Startup apply of the stored configuration image.

mod common;

use std::path::Path;
use std::time::Duration;

use common::{bitstream, Fixture, IMAGE_FILE};
use iceagent::boot::{configure_from_store, BootOutcome, RetryPolicy};
use iceagent::protocol::crc32;
use iceagent::storage::FileStore;

fn quick(max_attempts: Option<u32>) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

#[tokio::test]
async fn nothing_stored_leaves_device_unconfigured() {
    let fx = Fixture::new();
    let mut programmer = fx.fpga.clone();
    let outcome = configure_from_store(&fx.store, &mut programmer, Path::new(IMAGE_FILE), &quick(None))
        .await
        .unwrap();
    assert_eq!(outcome, BootOutcome::NoImage);
    assert_eq!(fx.fpga.apply_count(), 0);
}

#[tokio::test]
async fn stored_image_is_applied() {
    let mut fx = Fixture::new();
    let image = bitstream(512);
    fx.store.write(Path::new(IMAGE_FILE), &image).unwrap();

    let mut programmer = fx.fpga.clone();
    let outcome = configure_from_store(&fx.store, &mut programmer, Path::new(IMAGE_FILE), &quick(None))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        BootOutcome::Configured {
            attempts: 1,
            size: image.len(),
            crc: crc32(&image),
        }
    );
    assert_eq!(fx.fpga.loaded_image().unwrap().crc, crc32(&image));
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let mut fx = Fixture::new();
    let image = bitstream(256);
    fx.store.write(Path::new(IMAGE_FILE), &image).unwrap();
    fx.fpga.fail_next(3);

    let mut programmer = fx.fpga.clone();
    let outcome = configure_from_store(&fx.store, &mut programmer, Path::new(IMAGE_FILE), &quick(None))
        .await
        .unwrap();
    assert!(matches!(outcome, BootOutcome::Configured { attempts: 4, .. }));
    assert_eq!(fx.fpga.apply_count(), 4);
}

#[tokio::test]
async fn bounded_policy_gives_up() {
    let mut fx = Fixture::new();
    // No sync word: every attempt fails.
    fx.store.write(Path::new(IMAGE_FILE), &[0u8; 64]).unwrap();

    let mut programmer = fx.fpga.clone();
    let outcome = configure_from_store(&fx.store, &mut programmer, Path::new(IMAGE_FILE), &quick(Some(3)))
        .await
        .unwrap();
    assert_eq!(outcome, BootOutcome::GaveUp { attempts: 3 });
    assert_eq!(fx.fpga.apply_count(), 3);
    assert!(fx.fpga.loaded_image().is_none());
}
