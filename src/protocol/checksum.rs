//! Payload CRC-32.
//!
//! Reflected CRC-32 (poly 0x04C11DB7, init and xorout 0xFFFFFFFF), the value the
//! Linux `crc32` tool prints for a file. Used for diagnostics only.
use crc::{Crc, CRC_32_ISO_HDLC};

const CRC_CALCULATOR: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub fn crc32(data: &[u8]) -> u32 {
    CRC_CALCULATOR.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::crc32;

    #[test]
    fn check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_payload() {
        assert_eq!(crc32(&[]), 0);
    }
}
