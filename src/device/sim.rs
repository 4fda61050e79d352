//! In-memory iCE40-style target used on hosts without a real FPGA.
//!
//! Clones share state, so one clone can be handed to the dispatcher as the
//! register bus, another as the programmer, and a third kept for inspection.
use std::sync::{Arc, Mutex};

use log::{debug, info};

use super::{DeviceError, Programmer, RegisterBus};
use crate::protocol::crc32;

/// Number of addressable registers (7-bit index).
pub const REGISTER_COUNT: usize = 128;

/// iCE40 bitstream synchronization word.
pub const SYNC_WORD: [u8; 4] = [0x7E, 0xAA, 0x99, 0x7E];

/// Programmer status codes, mirroring what a hardware configurator reports.
pub const STATUS_EMPTY_IMAGE: u8 = 1;
pub const STATUS_NO_SYNC: u8 = 2;
pub const STATUS_DONE_LOW: u8 = 3;

#[derive(Debug)]
struct SimState {
    registers: [u32; REGISTER_COUNT],
    configured: Option<LoadedImage>,
    apply_count: u32,
    fail_next: u32,
    require_sync_word: bool,
}

/// Summary of the image currently loaded in the simulated device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    pub size: usize,
    pub crc: u32,
}

#[derive(Debug, Clone)]
pub struct SimFpga {
    state: Arc<Mutex<SimState>>,
}

impl SimFpga {
    pub fn new(require_sync_word: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                registers: [0; REGISTER_COUNT],
                configured: None,
                apply_count: 0,
                fail_next: 0,
                require_sync_word,
            })),
        }
    }

    /// Make the next `count` apply attempts fail as if CDONE never went high.
    pub fn fail_next(&self, count: u32) {
        self.lock().fail_next = count;
    }

    pub fn loaded_image(&self) -> Option<LoadedImage> {
        self.lock().configured
    }

    /// Number of apply attempts, successful or not.
    pub fn apply_count(&self) -> u32 {
        self.lock().apply_count
    }

    pub fn register(&self, index: u8) -> u32 {
        self.lock().registers[usize::from(index) % REGISTER_COUNT]
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().expect("sim fpga mutex poisoned")
    }
}

impl RegisterBus for SimFpga {
    fn read(&mut self, index: u8) -> u32 {
        let value = self.register(index);
        debug!("sim reg read {} = 0x{:08X}", index, value);
        value
    }

    fn write(&mut self, index: u8, value: u32) {
        debug!("sim reg write {} = 0x{:08X}", index, value);
        self.lock().registers[usize::from(index) % REGISTER_COUNT] = value;
    }
}

impl Programmer for SimFpga {
    fn apply(&mut self, image: &[u8]) -> Result<(), DeviceError> {
        let mut state = self.lock();
        state.apply_count += 1;
        if image.is_empty() {
            return Err(DeviceError::Program {
                status: STATUS_EMPTY_IMAGE,
            });
        }
        if state.require_sync_word && !image.windows(SYNC_WORD.len()).any(|w| w == SYNC_WORD) {
            return Err(DeviceError::Program {
                status: STATUS_NO_SYNC,
            });
        }
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(DeviceError::Program {
                status: STATUS_DONE_LOW,
            });
        }
        let loaded = LoadedImage {
            size: image.len(),
            crc: crc32(image),
        };
        // A fresh design comes up with its registers cleared.
        state.registers = [0; REGISTER_COUNT];
        state.configured = Some(loaded);
        info!(
            "sim fpga configured: {} bytes, CRC32 = 0x{:08X}",
            loaded.size, loaded.crc
        );
        Ok(())
    }
}
