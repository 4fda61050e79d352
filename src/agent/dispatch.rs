//! Command dispatcher.
//!
//! Maps a framed command onto the device, telemetry and store collaborators and
//! reports the result as status bits plus an optional 32-bit value. Never fails:
//! every problem degrades to a status bit for the peer.

use std::path::PathBuf;

use log::{info, warn};

use crate::device::{Programmer, RegisterBus, Telemetry};
use crate::protocol::{Command, Status, REGISTER_INDEX_MASK};
use crate::storage::FileStore;

/// Result of dispatching one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub status: Status,
    pub value: Option<u32>,
}

impl Outcome {
    fn ok(value: Option<u32>) -> Self {
        Self {
            status: Status::empty(),
            value,
        }
    }

    fn failed(status: Status) -> Self {
        Self {
            status,
            value: None,
        }
    }
}

/// Seam between the frame receiver and whatever executes commands.
pub trait Dispatch {
    fn dispatch(&mut self, command: Command, payload: &[u8]) -> Outcome;
}

/// Dispatcher backed by the board collaborators.
pub struct Dispatcher {
    registers: Box<dyn RegisterBus + Send>,
    programmer: Box<dyn Programmer + Send>,
    telemetry: Box<dyn Telemetry + Send>,
    store: Box<dyn FileStore + Send>,
    image_path: PathBuf,
}

impl Dispatcher {
    /// `image_path` is the store-relative path PersistConfig writes to.
    pub fn new(
        registers: Box<dyn RegisterBus + Send>,
        programmer: Box<dyn Programmer + Send>,
        telemetry: Box<dyn Telemetry + Send>,
        store: Box<dyn FileStore + Send>,
        image_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registers,
            programmer,
            telemetry,
            store,
            image_path: image_path.into(),
        }
    }

    fn read_register(&mut self, payload: &[u8]) -> Outcome {
        let Some(word) = payload_word(payload, 0) else {
            warn!("Reg read needs 4 payload bytes, got {}", payload.len());
            return Outcome::failed(Status::FAILED | Status::SHORT_PAYLOAD);
        };
        let index = register_index(word);
        let value = self.registers.read(index);
        info!("Reg read {} = 0x{:08X}", index, value);
        Outcome::ok(Some(value))
    }

    fn write_register(&mut self, payload: &[u8]) -> Outcome {
        let (Some(word), Some(value)) = (payload_word(payload, 0), payload_word(payload, 1)) else {
            warn!("Reg write needs 8 payload bytes, got {}", payload.len());
            return Outcome::failed(Status::FAILED | Status::SHORT_PAYLOAD);
        };
        let index = register_index(word);
        info!("Reg write {} = 0x{:08X}", index, value);
        self.registers.write(index, value);
        Outcome::ok(None)
    }

    fn read_telemetry(&mut self) -> Outcome {
        let millivolts = u32::from(self.telemetry.read_millivolts()) * 2;
        info!("Vbat = {} mV", millivolts);
        Outcome::ok(Some(millivolts))
    }

    fn persist_config(&mut self, payload: &[u8]) -> Outcome {
        match self.store.write(&self.image_path, payload) {
            Ok(()) => {
                info!(
                    "Stored {} byte image at {}",
                    payload.len(),
                    self.image_path.display()
                );
                Outcome::ok(None)
            }
            Err(e) => {
                warn!("Store error writing {}: {}", self.image_path.display(), e);
                Outcome::failed(Status::FAILED)
            }
        }
    }

    fn apply_config(&mut self, payload: &[u8]) -> Outcome {
        match self.programmer.apply(payload) {
            Ok(()) => {
                info!("FPGA configured OK ({} bytes)", payload.len());
                Outcome::ok(None)
            }
            Err(e) => {
                warn!("FPGA configuration ERROR: {}", e);
                Outcome::failed(Status::FAILED)
            }
        }
    }
}

impl Dispatch for Dispatcher {
    fn dispatch(&mut self, command: Command, payload: &[u8]) -> Outcome {
        match command {
            Command::ReadRegister => self.read_register(payload),
            Command::WriteRegister => self.write_register(payload),
            Command::ReadTelemetry => self.read_telemetry(),
            Command::PersistConfig => self.persist_config(payload),
            Command::ApplyConfig => self.apply_config(payload),
            Command::Unknown(code) => {
                info!("Unknown command 0x{:X}", code);
                Outcome::failed(Status::FAILED)
            }
        }
    }
}

/// Little-endian word `n` of the payload, if present.
fn payload_word(payload: &[u8], n: usize) -> Option<u32> {
    let start = n * 4;
    let bytes = payload.get(start..start + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn register_index(word: u32) -> u8 {
    (word & REGISTER_INDEX_MASK) as u8
}
