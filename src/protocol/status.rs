//! Reply status bitmask.
//!
//! One byte accumulated across the whole message: framing problems found by the
//! receiver and failures reported by the dispatcher are OR-ed together and sent
//! once, as the first byte of the reply.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Status: u8 {
        /// Payload buffer could not be allocated.
        const ALLOC_FAILED = 0x01;

        /// More bytes arrived than the header declared.
        const OVERRUN = 0x02;

        /// Header magic did not match.
        const WRONG_HEADER = 0x04;

        /// Unknown command, or the device / store rejected the request.
        const FAILED = 0x08;

        /// Declared length above the configured maximum; nothing was allocated.
        const TOO_LARGE = 0x10;

        /// Payload shorter than the command needs.
        const SHORT_PAYLOAD = 0x20;
    }
}

impl Status {
    /// Status byte as sent on the wire. Unknown bits are kept.
    pub const fn from_byte(byte: u8) -> Self {
        Self::from_bits_retain(byte)
    }

    pub const fn to_byte(self) -> u8 {
        self.bits()
    }

    /// True when no error bit is set.
    pub fn is_ok(self) -> bool {
        self.is_empty()
    }
}
