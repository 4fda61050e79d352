//! # Wire Protocol
//!
//! Bare, length-prefixed command protocol spoken on the agent's TCP port.
//!
//! ```text
//! request:  [word0: magic | cmd][word1: length][payload: length bytes]
//! reply:    [status]                  (write register, config, unknown)
//!           [status][value: u32 LE]   (read register, read telemetry)
//! ```
//!
//! All words are little-endian. See [`header`] for the header layout, [`Status`]
//! for the reply status bits and [`Command`] for the command table.

pub mod checksum;
pub mod header;
pub mod reply;
pub mod status;

pub use checksum::crc32;
pub use header::{Header, HEADER_LEN, MAGIC, MAGIC_MASK};
pub use reply::Reply;
pub use status::Status;

use thiserror::Error;

/// Well-known TCP port of the agent.
pub const DEFAULT_PORT: u16 = 3333;

/// Register index bits taken from the first payload word.
pub const REGISTER_INDEX_MASK: u32 = 0x7F;

/// Commands carried in the low nibble of header word 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    ReadRegister,
    WriteRegister,
    ReadTelemetry,
    /// Store the payload as the boot-time configuration image.
    PersistConfig,
    /// Program the target device with the payload.
    ApplyConfig,
    Unknown(u8),
}

impl Command {
    pub fn from_code(code: u8) -> Self {
        match code & 0x0F {
            0x0 => Command::ReadRegister,
            0x1 => Command::WriteRegister,
            0x2 => Command::ReadTelemetry,
            0xE => Command::PersistConfig,
            0xF => Command::ApplyConfig,
            other => Command::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Command::ReadRegister => 0x0,
            Command::WriteRegister => 0x1,
            Command::ReadTelemetry => 0x2,
            Command::PersistConfig => 0xE,
            Command::ApplyConfig => 0xF,
            Command::Unknown(code) => code & 0x0F,
        }
    }

    /// Whether the reply carries a 4-byte value after the status byte.
    pub fn returns_value(self) -> bool {
        matches!(self, Command::ReadRegister | Command::ReadTelemetry)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("wrong header magic: word 0x{word:08X}")]
    WrongMagic { word: u32 },

    #[error("reply length {actual}, expected {expected}")]
    ReplyLength { expected: usize, actual: usize },
}
