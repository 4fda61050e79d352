//! Front panel: long-press reset button and status LED.
//!
//! Both are wired through sysfs-style value files (`0`/`1`). The button is
//! active low. Holding it for the configured time erases the link credentials,
//! after which [`watch_reset_input`] returns so the process can exit and be
//! restarted by its supervisor.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use tokio::time::interval;

use crate::link::reset_credentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    /// Button was down at startup; waiting for a release before arming.
    Disarmed,
    Idle,
    Held { since: Instant },
    /// Already fired for this press; waits for release.
    Fired,
}

/// Debounced long-press detector.
#[derive(Debug, Clone)]
pub struct HoldDetector {
    threshold: Duration,
    state: HoldState,
}

impl HoldDetector {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            state: HoldState::Disarmed,
        }
    }

    pub fn state(&self) -> HoldState {
        self.state
    }

    /// Feed one sample. Returns true exactly once per press, when the button
    /// has been held for the threshold.
    pub fn update(&mut self, pressed: bool, now: Instant) -> bool {
        let next = match (self.state, pressed) {
            (HoldState::Disarmed, true) => HoldState::Disarmed,
            (HoldState::Fired, true) => HoldState::Fired,
            (_, false) => HoldState::Idle,
            (HoldState::Idle, true) => HoldState::Held { since: now },
            (HoldState::Held { since }, true) => {
                if now.duration_since(since) >= self.threshold {
                    HoldState::Fired
                } else {
                    HoldState::Held { since }
                }
            }
        };
        if next != self.state {
            debug!("Reset button: {:?}", next);
        }
        let fired = next == HoldState::Fired && self.state != HoldState::Fired;
        self.state = next;
        fired
    }
}

/// Read an active-low input. `0` means pressed.
fn read_pressed(path: &Path) -> Result<bool> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read input {}: {}", path.display(), e))?;
    match raw.trim() {
        "0" => Ok(true),
        "1" => Ok(false),
        other => Err(anyhow!("Unexpected input level '{}' in {}", other, path.display())),
    }
}

/// Poll the reset input until a long press, then erase `credentials`.
///
/// Fails only if the input does not exist at startup. Later read errors are
/// logged once per streak and the sample is skipped.
pub async fn watch_reset_input(
    input: PathBuf,
    hold: Duration,
    poll: Duration,
    credentials: PathBuf,
) -> Result<()> {
    if !input.exists() {
        return Err(anyhow!("Reset input {} does not exist", input.display()));
    }
    let mut detector = HoldDetector::new(hold);
    let mut ticker = interval(poll.max(Duration::from_millis(1)));
    let mut failing = false;
    info!("Watching reset input {}", input.display());
    loop {
        ticker.tick().await;
        let pressed = match read_pressed(&input) {
            Ok(pressed) => {
                if failing {
                    info!("Reset input {} readable again", input.display());
                    failing = false;
                }
                pressed
            }
            Err(e) => {
                if !failing {
                    warn!("{}; still polling", e);
                    failing = true;
                }
                continue;
            }
        };
        if detector.update(pressed, Instant::now()) {
            info!(
                "Reset held for >= {} ms: clearing link credentials",
                hold.as_millis()
            );
            reset_credentials(&credentials)?;
            info!("Restarting...");
            return Ok(());
        }
    }
}

/// Toggle the status LED every `period`. Stops on the first write error.
pub async fn blink(output: PathBuf, period: Duration) {
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    let mut on = false;
    loop {
        ticker.tick().await;
        on = !on;
        if let Err(e) = std::fs::write(&output, if on { "1" } else { "0" }) {
            warn!("Status LED {} unavailable: {}", output.display(), e);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOLD: Duration = Duration::from_secs(3);

    #[test]
    fn press_at_boot_is_ignored_until_release() {
        let t0 = Instant::now();
        let mut d = HoldDetector::new(HOLD);
        assert!(!d.update(true, t0));
        assert!(!d.update(true, t0 + Duration::from_secs(10)));
        assert_eq!(d.state(), HoldState::Disarmed);
        assert!(!d.update(false, t0 + Duration::from_secs(11)));
        assert_eq!(d.state(), HoldState::Idle);
    }

    #[test]
    fn fires_once_after_full_hold() {
        let t0 = Instant::now();
        let mut d = HoldDetector::new(HOLD);
        d.update(false, t0);
        assert!(!d.update(true, t0 + Duration::from_secs(1)));
        assert!(!d.update(true, t0 + Duration::from_millis(3900)));
        assert!(d.update(true, t0 + Duration::from_secs(4)));
        assert!(!d.update(true, t0 + Duration::from_secs(9)));
        assert_eq!(d.state(), HoldState::Fired);
    }

    #[test]
    fn short_presses_restart_the_timer() {
        let t0 = Instant::now();
        let mut d = HoldDetector::new(HOLD);
        d.update(false, t0);
        d.update(true, t0);
        d.update(false, t0 + Duration::from_secs(2));
        d.update(true, t0 + Duration::from_secs(3));
        assert!(!d.update(true, t0 + Duration::from_secs(5)));
        assert!(d.update(true, t0 + Duration::from_secs(6)));
    }

    #[tokio::test]
    async fn long_press_clears_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("value");
        let creds = dir.path().join("link-credentials");
        std::fs::write(&input, "1\n").unwrap();
        std::fs::write(&creds, "ssid=lab").unwrap();

        let task = tokio::spawn(watch_reset_input(
            input.clone(),
            Duration::from_millis(30),
            Duration::from_millis(2),
            creds.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(&input, "0\n").unwrap();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("watcher should fire")
            .unwrap()
            .unwrap();
        assert!(!creds.exists());
    }

    #[tokio::test]
    async fn bad_reads_do_not_stop_the_watcher() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("value");
        let creds = dir.path().join("link-credentials");
        std::fs::write(&input, "garbage\n").unwrap();
        std::fs::write(&creds, "ssid=lab").unwrap();

        let task = tokio::spawn(watch_reset_input(
            input.clone(),
            Duration::from_millis(30),
            Duration::from_millis(2),
            creds.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::remove_file(&input).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        std::fs::write(&input, "1\n").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(&input, "0\n").unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("watcher should fire")
            .unwrap()
            .unwrap();
        assert!(!creds.exists());
    }

    #[tokio::test]
    async fn missing_input_at_startup_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = watch_reset_input(
            dir.path().join("absent"),
            Duration::from_millis(30),
            Duration::from_millis(2),
            dir.path().join("link-credentials"),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn blink_stops_when_output_missing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("missing-dir").join("brightness");
        tokio::time::timeout(
            Duration::from_secs(1),
            blink(output, Duration::from_millis(1)),
        )
        .await
        .expect("blink returns on write error");
    }
}
