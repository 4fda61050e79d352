//! Message framing: header validation, payload accumulation, reply shapes and
//! re-synchronization, driven through the receiver with the real dispatcher.

mod common;

use common::{bitstream, frame, words, Fixture, IMAGE_FILE};
use iceagent::agent::{FrameReceiver, RxState};
use iceagent::protocol::crc32;
use iceagent::storage::FileStore;
use std::path::Path;

fn feed_all(rx: &mut FrameReceiver, fx: &Fixture, chunks: &[&[u8]]) -> Vec<Option<Vec<u8>>> {
    let mut d = fx.dispatcher();
    chunks
        .iter()
        .map(|c| rx.feed(c, &mut d).map(|r| r.to_bytes()))
        .collect()
}

#[test]
fn write_register_in_one_chunk() {
    let fx = Fixture::new();
    let mut rx = FrameReceiver::new(None);
    let msg = [
        0xE1, 0xBE, 0xFE, 0xCA, 0x08, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0xDD, 0xCC, 0xBB,
        0xAA,
    ];
    let replies = feed_all(&mut rx, &fx, &[&msg]);
    assert_eq!(replies, vec![Some(vec![0x00])]);
    assert_eq!(fx.fpga.register(5), 0xAABB_CCDD);
    assert_eq!(rx.state(), RxState::Done);
}

#[test]
fn one_byte_chunks_give_identical_reply() {
    let fx = Fixture::new();
    let msg = frame(0x1, &words(&[9, 0x1234_5678]));

    let mut whole = FrameReceiver::new(None);
    let expected = feed_all(&mut whole, &fx, &[&msg]).pop().flatten();

    let mut split = FrameReceiver::new(None);
    let chunks: Vec<&[u8]> = msg.chunks(1).collect();
    let replies = feed_all(&mut split, &fx, &chunks);
    let (last, earlier) = replies.split_last().unwrap();
    assert!(earlier.iter().all(Option::is_none));
    assert_eq!(last, &expected);
    assert_eq!(expected, Some(vec![0x00]));
    assert_eq!(fx.fpga.register(9), 0x1234_5678);
}

#[test]
fn telemetry_reply_is_five_bytes() {
    let fx = Fixture::new();
    let mut rx = FrameReceiver::new(None);
    let replies = feed_all(&mut rx, &fx, &[&frame(0x2, &[])]);
    // 1650 mV raw, doubled: 3300 = 0x0CE4
    assert_eq!(replies, vec![Some(vec![0x00, 0xE4, 0x0C, 0x00, 0x00])]);
}

#[test]
fn read_register_returns_value() {
    let fx = Fixture::new();
    let mut rx = FrameReceiver::new(None);
    let replies = feed_all(
        &mut rx,
        &fx,
        &[&frame(0x1, &words(&[3, 0xDEAD_BEEF])), &frame(0x0, &words(&[3]))],
    );
    assert_eq!(
        replies,
        vec![Some(vec![0x00]), Some(vec![0x00, 0xEF, 0xBE, 0xAD, 0xDE])]
    );
}

#[test]
fn wrong_magic_replies_single_byte_and_recovers() {
    let fx = Fixture::new();
    let mut rx = FrameReceiver::new(None);
    let mut bad = words(&[0xDEAD_BEE2, 0]);
    bad.extend_from_slice(&[0xAA; 5]);
    let replies = feed_all(&mut rx, &fx, &[&bad, &frame(0x2, &[])]);
    assert_eq!(replies[0], Some(vec![0x04]));
    assert_eq!(replies[1], Some(vec![0x00, 0xE4, 0x0C, 0x00, 0x00]));
}

#[test]
fn unknown_command_fails() {
    let fx = Fixture::new();
    let mut rx = FrameReceiver::new(None);
    let replies = feed_all(
        &mut rx,
        &fx,
        &[&frame(0x7, &[]), &frame(0x7, &[1, 2, 3])],
    );
    assert_eq!(replies, vec![Some(vec![0x08]), Some(vec![0x08])]);
}

#[test]
fn overrun_is_flagged_and_next_message_is_clean() {
    let fx = Fixture::new();
    let mut rx = FrameReceiver::new(None);
    let mut first = frame(0x2, &[]);
    first.extend_from_slice(&[0x01, 0x02, 0x03]);
    let replies = feed_all(&mut rx, &fx, &[&first, &frame(0x2, &[])]);
    assert_eq!(replies[0], Some(vec![0x02, 0xE4, 0x0C, 0x00, 0x00]));
    assert_eq!(replies[1], Some(vec![0x00, 0xE4, 0x0C, 0x00, 0x00]));
}

#[test]
fn payload_split_across_chunks_is_applied_once() {
    let fx = Fixture::new();
    let image = bitstream(300);
    let msg = frame(0xF, &image);
    let mut rx = FrameReceiver::new(None);
    let chunks: Vec<&[u8]> = msg.chunks(7).collect();
    let replies = feed_all(&mut rx, &fx, &chunks);
    assert_eq!(replies.iter().flatten().count(), 1);
    assert_eq!(replies.last().cloned().flatten(), Some(vec![0x00]));
    assert_eq!(fx.fpga.apply_count(), 1);
    let loaded = fx.fpga.loaded_image().unwrap();
    assert_eq!(loaded.size, image.len());
    assert_eq!(loaded.crc, crc32(&image));
}

#[test]
fn apply_failure_reports_failed() {
    let fx = Fixture::new();
    let mut rx = FrameReceiver::new(None);
    // No sync word: the simulated programmer rejects it.
    let replies = feed_all(&mut rx, &fx, &[&frame(0xF, &[0u8; 64])]);
    assert_eq!(replies, vec![Some(vec![0x08])]);
    assert!(fx.fpga.loaded_image().is_none());
}

#[test]
fn persist_writes_image_to_store() {
    let fx = Fixture::new();
    let image = bitstream(128);
    let mut rx = FrameReceiver::new(None);
    let replies = feed_all(&mut rx, &fx, &[&frame(0xE, &image)]);
    assert_eq!(replies, vec![Some(vec![0x00])]);
    let stored = fx.store.read(Path::new(IMAGE_FILE)).unwrap();
    assert_eq!(stored, Some(image));
    // Persisting does not program the device.
    assert_eq!(fx.fpga.apply_count(), 0);
}

#[test]
fn oversize_payload_is_drained_without_dispatch() {
    let fx = Fixture::new();
    let mut rx = FrameReceiver::new(Some(16));
    let msg = frame(0xF, &bitstream(40));
    let replies = feed_all(&mut rx, &fx, &[&msg[..8], &msg[8..24], &msg[24..]]);
    assert_eq!(replies, vec![None, None, Some(vec![0x10])]);
    assert_eq!(rx.buffered_capacity(), 0);
    assert_eq!(fx.fpga.apply_count(), 0);

    // Value commands keep their reply shape.
    let replies = feed_all(&mut rx, &fx, &[&frame(0x0, &[0u8; 20])]);
    assert_eq!(replies, vec![Some(vec![0x10, 0, 0, 0, 0])]);
}

#[test]
fn short_register_payload_is_rejected() {
    let fx = Fixture::new();
    let mut rx = FrameReceiver::new(None);
    let replies = feed_all(&mut rx, &fx, &[&frame(0x1, &words(&[5]))]);
    assert_eq!(replies, vec![Some(vec![0x28])]);
    assert_eq!(fx.fpga.register(5), 0);
}
