//! Process-wide counters for the connection server and frame receiver.
use std::sync::atomic::{AtomicU64, Ordering};

static CONNECTIONS_ACCEPTED: AtomicU64 = AtomicU64::new(0);
static CONNECTIONS_ABORTED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_DISPATCHED: AtomicU64 = AtomicU64::new(0);
static MESSAGES_REJECTED: AtomicU64 = AtomicU64::new(0);
static FRAMING_ERRORS: AtomicU64 = AtomicU64::new(0);
static BYTES_RECEIVED: AtomicU64 = AtomicU64::new(0);
// u64 so "no payload yet" fits next to every u32 value.
static LAST_PAYLOAD_CRC: AtomicU64 = AtomicU64::new(u64::MAX);

pub fn inc_connections_accepted() {
    CONNECTIONS_ACCEPTED.fetch_add(1, Ordering::Relaxed);
}

/// Connection closed by the peer (or a socket error) in the middle of a message.
pub fn inc_connections_aborted() {
    CONNECTIONS_ABORTED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_messages_dispatched() {
    MESSAGES_DISPATCHED.fetch_add(1, Ordering::Relaxed);
}

/// Message answered without dispatch (wrong header, oversize, allocation failure).
pub fn inc_messages_rejected() {
    MESSAGES_REJECTED.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_framing_errors() {
    FRAMING_ERRORS.fetch_add(1, Ordering::Relaxed);
}

pub fn add_bytes_received(n: usize) {
    BYTES_RECEIVED.fetch_add(n as u64, Ordering::Relaxed);
}

pub fn record_payload_crc(crc: u32) {
    LAST_PAYLOAD_CRC.store(u64::from(crc), Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub connections_accepted: u64,
    pub connections_aborted: u64,
    pub messages_dispatched: u64,
    pub messages_rejected: u64,
    pub framing_errors: u64,
    pub bytes_received: u64,
    pub last_payload_crc: Option<u32>,
}

pub fn snapshot() -> Snapshot {
    let crc = LAST_PAYLOAD_CRC.load(Ordering::Relaxed);
    Snapshot {
        connections_accepted: CONNECTIONS_ACCEPTED.load(Ordering::Relaxed),
        connections_aborted: CONNECTIONS_ABORTED.load(Ordering::Relaxed),
        messages_dispatched: MESSAGES_DISPATCHED.load(Ordering::Relaxed),
        messages_rejected: MESSAGES_REJECTED.load(Ordering::Relaxed),
        framing_errors: FRAMING_ERRORS.load(Ordering::Relaxed),
        bytes_received: BYTES_RECEIVED.load(Ordering::Relaxed),
        last_payload_crc: u32::try_from(crc).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Counters are global and other tests in this binary touch them, so only
    // check that they move forward.
    #[test]
    fn counters_advance() {
        let before = snapshot();
        inc_connections_accepted();
        inc_messages_dispatched();
        add_bytes_received(12);
        record_payload_crc(0xCBF4_3926);
        let after = snapshot();
        assert!(after.connections_accepted > before.connections_accepted);
        assert!(after.messages_dispatched > before.messages_dispatched);
        assert!(after.bytes_received >= before.bytes_received + 12);
        assert!(after.last_payload_crc.is_some());
    }
}
