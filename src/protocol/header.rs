//! Fixed 8-byte request header.
//!
//! Two little-endian words:
//!
//!   word 0: `0xCAFEBEE` in bits 31..4, command code in bits 3..0
//!   word 1: payload length in bytes
use super::{Command, ProtocolError};

/// Size of the serialized header.
pub const HEADER_LEN: usize = 8;

/// Magic value carried in the top 28 bits of word 0.
pub const MAGIC: u32 = 0xCAFE_BEE0;

/// Bits of word 0 that must equal [`MAGIC`].
pub const MAGIC_MASK: u32 = 0xFFFF_FFF0;

const COMMAND_MASK: u32 = 0x0000_000F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub command: Command,
    /// Declared payload length. Peer controlled, never trusted for allocation
    /// without a bound check.
    pub length: u32,
}

impl Header {
    pub fn new(command: Command, length: u32) -> Self {
        Self { command, length }
    }

    /// Decode a complete header, rejecting words whose top 28 bits are not the magic.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
        let word0 = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let length = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if word0 & MAGIC_MASK != MAGIC {
            return Err(ProtocolError::WrongMagic { word: word0 });
        }
        let command = Command::from_code((word0 & COMMAND_MASK) as u8);
        Ok(Self { command, length })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let word0 = MAGIC | (u32::from(self.command.code()) & COMMAND_MASK);
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(&word0.to_le_bytes());
        out[4..].copy_from_slice(&self.length.to_le_bytes());
        out
    }
}
