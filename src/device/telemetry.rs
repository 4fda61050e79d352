//! Battery voltage sources.
use std::path::PathBuf;

use log::warn;

use super::Telemetry;

/// Reports a constant reading. Used when the host has no battery sensor.
#[derive(Debug, Clone, Copy)]
pub struct FixedTelemetry {
    millivolts: u16,
}

impl FixedTelemetry {
    pub fn new(millivolts: u16) -> Self {
        Self { millivolts }
    }
}

impl Telemetry for FixedTelemetry {
    fn read_millivolts(&mut self) -> u16 {
        self.millivolts
    }
}

/// Reads a Linux hwmon voltage input (`/sys/class/hwmon/hwmonN/inM_input`),
/// which reports millivolts as decimal text.
#[derive(Debug, Clone)]
pub struct HwmonTelemetry {
    path: PathBuf,
}

impl HwmonTelemetry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Telemetry for HwmonTelemetry {
    fn read_millivolts(&mut self) -> u16 {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                return 0;
            }
        };
        match raw.trim().parse::<u32>() {
            Ok(mv) => u16::try_from(mv).unwrap_or(u16::MAX),
            Err(e) => {
                warn!("Unparseable voltage '{}' in {}: {}", raw.trim(), self.path.display(), e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hwmon_reads_millivolts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in0_input");
        std::fs::write(&path, "1842\n").unwrap();
        let mut sensor = HwmonTelemetry::new(&path);
        assert_eq!(sensor.read_millivolts(), 1842);
    }

    #[test]
    fn hwmon_missing_file_reads_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut sensor = HwmonTelemetry::new(dir.path().join("missing"));
        assert_eq!(sensor.read_millivolts(), 0);
    }
}
