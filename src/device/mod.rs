//! # Target Device Interfaces
//!
//! The agent never talks to hardware directly. Everything it needs from the
//! board is expressed as a small trait so the dispatcher, the boot sequence and
//! the tests can run against any backend:
//!
//! - [`RegisterBus`] - read/write the 32-bit registers exposed by the loaded design
//! - [`Programmer`] - shift a configuration image into the device
//! - [`Telemetry`] - battery voltage in millivolts
//!
//! [`sim::SimFpga`] implements the register bus and programmer in memory, and
//! [`telemetry`] provides fixed and hwmon-backed voltage sources.

pub mod sim;
pub mod telemetry;

pub use sim::SimFpga;
pub use telemetry::{FixedTelemetry, HwmonTelemetry};

use thiserror::Error;

/// Errors reported by device backends.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The programmer finished with a non-zero status code.
    #[error("configuration failed with status {status}")]
    Program { status: u8 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Register interface of the configured design. Indices are 7 bits wide.
pub trait RegisterBus {
    fn read(&mut self, index: u8) -> u32;
    fn write(&mut self, index: u8, value: u32);
}

/// Loads a configuration image into the target device.
pub trait Programmer {
    fn apply(&mut self, image: &[u8]) -> Result<(), DeviceError>;
}

/// Battery voltage source. Returns the raw divided reading in millivolts;
/// callers scale it by two to undo the board's resistor divider.
pub trait Telemetry {
    fn read_millivolts(&mut self) -> u16;
}
