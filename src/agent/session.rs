//! One accepted connection: read chunks, feed the receiver, write replies.
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::dispatch::Dispatch;
use super::receiver::FrameReceiver;
use crate::metrics;

/// Per-session tuning, taken from the server config.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub read_buffer_bytes: usize,
    pub max_payload: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_buffer_bytes: 1024,
            max_payload: Some(4 * 1024 * 1024),
        }
    }
}

/// What happened on a finished session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub bytes_received: usize,
    pub replies_sent: usize,
    /// Peer closed in the middle of a message.
    pub aborted: bool,
}

/// Run the receive loop until the peer closes the connection.
///
/// Socket errors end the session with `Err`; any partially received message is
/// released first. There is no read timeout: an idle peer holds the session open.
pub async fn run_session<S, D>(
    stream: &mut S,
    peer: &str,
    dispatcher: &mut D,
    config: SessionConfig,
) -> std::io::Result<SessionSummary>
where
    S: AsyncRead + AsyncWrite + Unpin,
    D: Dispatch,
{
    let mut receiver = FrameReceiver::new(config.max_payload);
    let mut buf = vec![0u8; config.read_buffer_bytes.max(1)];
    let mut summary = SessionSummary::default();

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                if receiver.abort() {
                    metrics::inc_connections_aborted();
                }
                return Err(e);
            }
        };
        if n == 0 {
            summary.aborted = receiver.abort();
            if summary.aborted {
                metrics::inc_connections_aborted();
            }
            info!(
                "Connection {} closed, {} bytes received, state {:?}",
                peer,
                summary.bytes_received,
                receiver.state()
            );
            return Ok(summary);
        }

        summary.bytes_received += n;
        metrics::add_bytes_received(n);
        debug!("{}: {} bytes", peer, n);

        if let Some(reply) = receiver.feed(&buf[..n], dispatcher) {
            stream.write_all(&reply.to_bytes()).await?;
            stream.flush().await?;
            summary.replies_sent += 1;
        }
    }
}
