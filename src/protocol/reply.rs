use super::{Command, ProtocolError, Status};

/// Reply to one message: a status byte, followed by a little-endian u32 for
/// commands that return a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub value: Option<u32>,
}

impl Reply {
    /// Status-only reply (wrong header, or a command without a result).
    pub fn status_only(status: Status) -> Self {
        Self {
            status,
            value: None,
        }
    }

    /// Reply shaped for `command`: commands that return a value always carry
    /// four value bytes, even when the value could not be produced.
    pub fn for_command(command: Command, status: Status, value: Option<u32>) -> Self {
        let value = if command.returns_value() {
            Some(value.unwrap_or(0))
        } else {
            None
        };
        Self { status, value }
    }

    /// Number of bytes this reply occupies on the wire.
    pub fn wire_len(&self) -> usize {
        if self.value.is_some() {
            5
        } else {
            1
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        out.push(self.status.to_byte());
        if let Some(value) = self.value {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Decode a reply read back by a client that sent `command`.
    pub fn parse(command: Command, bytes: &[u8]) -> Result<Self, ProtocolError> {
        let expected = if command.returns_value() { 5 } else { 1 };
        if bytes.len() != expected {
            return Err(ProtocolError::ReplyLength {
                expected,
                actual: bytes.len(),
            });
        }
        let status = Status::from_byte(bytes[0]);
        let value = if command.returns_value() {
            Some(u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]))
        } else {
            None
        };
        Ok(Self { status, value })
    }
}
