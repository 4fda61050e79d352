//! Per-connection receive state machine.
//!
//! Bytes arrive from the socket in chunks of any size. The receiver collects the
//! 8-byte header, then exactly `length` payload bytes, dispatches the message once
//! and hands back the reply to send. The payload buffer is reserved with exactly
//! the declared capacity and released as soon as the message is done.
//!
//! Re-synchronization policy: each chunk contributes to at most one message.
//! Bytes left in a chunk after a wrong header or after a completed payload are
//! dropped. Payloads that will not be stored (too large, allocation failed) are
//! drained by length so the following header still lines up.

use log::{debug, info, trace, warn};

use super::dispatch::Dispatch;
use crate::logutil::hex_preview;
use crate::metrics;
use crate::protocol::{crc32, Header, Reply, Status, HEADER_LEN};

/// Receive state, per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    AwaitingHeader,
    AccumulatingPayload,
    /// Header accepted but the payload is being dropped.
    Discarding,
    /// Reply produced; the next chunk starts a new message.
    Done,
}

pub struct FrameReceiver {
    state: RxState,
    header_buf: [u8; HEADER_LEN],
    header_len: usize,
    header: Option<Header>,
    payload: Option<Vec<u8>>,
    remaining: usize,
    status: Status,
    max_payload: Option<usize>,
    /// Makes every payload reservation fail.
    #[cfg(test)]
    refuse_alloc: bool,
}

impl FrameReceiver {
    /// `max_payload` bounds the declared length the receiver will allocate for;
    /// `None` trusts the peer.
    pub fn new(max_payload: Option<usize>) -> Self {
        Self {
            state: RxState::AwaitingHeader,
            header_buf: [0; HEADER_LEN],
            header_len: 0,
            header: None,
            payload: None,
            remaining: 0,
            status: Status::empty(),
            max_payload,
            #[cfg(test)]
            refuse_alloc: false,
        }
    }

    pub fn state(&self) -> RxState {
        self.state
    }

    /// True while part of a message has been received.
    pub fn in_flight(&self) -> bool {
        match self.state {
            RxState::AwaitingHeader => self.header_len > 0,
            RxState::AccumulatingPayload | RxState::Discarding => true,
            RxState::Done => false,
        }
    }

    /// Bytes currently reserved for a payload.
    pub fn buffered_capacity(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::capacity)
    }

    /// Feed one inbound chunk. Returns the reply once a message is complete.
    pub fn feed<D: Dispatch>(&mut self, chunk: &[u8], dispatcher: &mut D) -> Option<Reply> {
        if self.state == RxState::Done {
            self.reset();
        }
        let mut rest = chunk;

        loop {
            match self.state {
                RxState::AwaitingHeader => {
                    let take = (HEADER_LEN - self.header_len).min(rest.len());
                    self.header_buf[self.header_len..self.header_len + take]
                        .copy_from_slice(&rest[..take]);
                    self.header_len += take;
                    rest = &rest[take..];
                    if self.header_len < HEADER_LEN {
                        return None;
                    }
                    match Header::parse(&self.header_buf) {
                        Ok(header) => self.begin_payload(header),
                        Err(e) => {
                            warn!("{} ({})", e, hex_preview(&self.header_buf, HEADER_LEN));
                            self.status |= Status::WRONG_HEADER;
                            metrics::inc_framing_errors();
                            if !rest.is_empty() {
                                debug!("Dropping {} bytes after wrong header", rest.len());
                            }
                            return Some(self.reject());
                        }
                    }
                }
                RxState::AccumulatingPayload | RxState::Discarding => {
                    let take = self.remaining.min(rest.len());
                    if let Some(buf) = self.payload.as_mut() {
                        buf.extend_from_slice(&rest[..take]);
                    }
                    self.remaining -= take;
                    rest = &rest[take..];
                    if self.remaining > 0 {
                        trace!("{} payload bytes still expected", self.remaining);
                        return None;
                    }
                    if !rest.is_empty() {
                        warn!(
                            "Received {} bytes past declared length: {}",
                            rest.len(),
                            hex_preview(rest, 16)
                        );
                        self.status |= Status::OVERRUN;
                        metrics::inc_framing_errors();
                    }
                    return Some(if self.payload.is_some() {
                        self.complete(dispatcher)
                    } else {
                        self.reject()
                    });
                }
                RxState::Done => return None,
            }
        }
    }

    /// Connection closed. Releases any payload buffer; returns true if a
    /// message was cut short.
    pub fn abort(&mut self) -> bool {
        let cut_short = self.in_flight();
        if let Some(buf) = self.payload.take() {
            warn!(
                "Connection closed with {} of {} payload bytes received; buffer released",
                buf.len(),
                buf.capacity()
            );
        } else if cut_short {
            warn!("Connection closed mid-message in state {:?}", self.state);
        }
        self.reset();
        cut_short
    }

    fn begin_payload(&mut self, header: Header) {
        info!(
            "Found header: cmd {:X}, length = {}",
            header.command.code(),
            header.length
        );
        self.header = Some(header);

        let length = usize::try_from(header.length).ok();
        self.remaining = length.unwrap_or(usize::MAX);
        self.state = RxState::Discarding;
        match length {
            Some(length) if self.max_payload.map_or(true, |max| length <= max) => {
                if let Some(buf) = self.reserve_payload(length) {
                    self.payload = Some(buf);
                    self.state = RxState::AccumulatingPayload;
                } else {
                    warn!("Couldn't allocate {} byte payload buffer", length);
                    self.status |= Status::ALLOC_FAILED;
                    metrics::inc_framing_errors();
                }
            }
            _ => {
                warn!(
                    "Declared length {} exceeds limit {:?}; draining",
                    header.length, self.max_payload
                );
                self.status |= Status::TOO_LARGE;
                metrics::inc_framing_errors();
            }
        }
    }

    fn reserve_payload(&self, length: usize) -> Option<Vec<u8>> {
        if self.alloc_refused() {
            return None;
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(length).ok()?;
        Some(buf)
    }

    #[cfg(test)]
    fn alloc_refused(&self) -> bool {
        self.refuse_alloc
    }

    #[cfg(not(test))]
    fn alloc_refused(&self) -> bool {
        false
    }

    fn complete<D: Dispatch>(&mut self, dispatcher: &mut D) -> Reply {
        let payload = self.payload.take().unwrap_or_default();
        // Only called after a header was accepted.
        let Some(header) = self.header else {
            return self.reject();
        };
        let crc = crc32(&payload);
        info!(
            "Received {} bytes, CRC32 = 0x{:08X}",
            payload.len(),
            crc
        );
        metrics::record_payload_crc(crc);

        let outcome = dispatcher.dispatch(header.command, &payload);
        drop(payload);
        metrics::inc_messages_dispatched();

        self.status |= outcome.status;
        self.state = RxState::Done;
        let reply = Reply::for_command(header.command, self.status, outcome.value);
        info!("Replying with 0x{:02X}", reply.status.to_byte());
        reply
    }

    /// Finish a message without dispatch.
    fn reject(&mut self) -> Reply {
        metrics::inc_messages_rejected();
        self.payload = None;
        self.state = RxState::Done;
        let reply = match self.header {
            Some(header) => Reply::for_command(header.command, self.status, None),
            None => Reply::status_only(self.status),
        };
        info!("Replying with 0x{:02X} (not dispatched)", reply.status.to_byte());
        reply
    }

    fn reset(&mut self) {
        self.state = RxState::AwaitingHeader;
        self.header_len = 0;
        self.header = None;
        self.payload = None;
        self.remaining = 0;
        self.status = Status::empty();
    }
}
