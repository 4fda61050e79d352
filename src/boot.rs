//! Boot-time configuration: load the stored image into the target device
//! before the network comes up.
//!
//! The device is useless without a design, so by default the apply is retried
//! until it succeeds. A [`RetryPolicy`] can bound the attempts; the attempt
//! count is always reported.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{info, warn};
use tokio::time::sleep;

use crate::device::Programmer;
use crate::protocol::crc32;
use crate::storage::FileStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay after the first failure; doubles after each further failure.
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.backoff
            .saturating_mul(1u32 << shift)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// Nothing stored yet; the device stays unconfigured until a peer sends an image.
    NoImage,
    Configured { attempts: u32, size: usize, crc: u32 },
    GaveUp { attempts: u32 },
}

/// Read the stored image and apply it according to `policy`.
///
/// Store read errors are returned; programmer failures are retried.
pub async fn configure_from_store(
    store: &dyn FileStore,
    programmer: &mut dyn Programmer,
    image_path: &Path,
    policy: &RetryPolicy,
) -> Result<BootOutcome> {
    info!("Reading file {}", image_path.display());
    let image = store
        .read(image_path)
        .map_err(|e| anyhow!("Failed to read stored image {}: {}", image_path.display(), e))?;
    let Some(image) = image else {
        info!("No stored image at {}; device left unconfigured", image_path.display());
        return Ok(BootOutcome::NoImage);
    };
    let crc = crc32(&image);
    info!("Stored image: {} bytes, CRC32 = 0x{:08X}", image.len(), crc);

    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match programmer.apply(&image) {
            Ok(()) => {
                info!("FPGA configured OK after {} attempt(s)", attempts);
                return Ok(BootOutcome::Configured {
                    attempts,
                    size: image.len(),
                    crc,
                });
            }
            Err(e) => {
                warn!("FPGA configure ERROR (attempt {}): {}", attempts, e);
                if policy.max_attempts.is_some_and(|max| attempts >= max) {
                    warn!("Giving up on stored image after {} attempts", attempts);
                    return Ok(BootOutcome::GaveUp { attempts });
                }
                sleep(policy.delay_after(attempts)).await;
            }
        }
    }
}
