//! Network link state shared between whoever manages connectivity and the
//! startup path that waits for it.
//!
//! Single writer, many readers: [`LinkState::set_connected`] publishes, and any
//! clone can poll [`LinkState::is_connected`] or await
//! [`LinkState::wait_connected`].

use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use log::info;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct LinkState {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for LinkState {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkState {
    /// Starts disconnected.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_connected(&self, connected: bool) {
        let was = self.tx.send_replace(connected);
        if was != connected {
            info!("{}", if connected { "Link connected" } else { "Link disconnected" });
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the link is up (immediately if it already is).
    pub async fn wait_connected(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|up| *up).await;
    }
}

/// Forget stored link credentials so the next start comes up unprovisioned.
/// Returns whether anything was removed.
pub fn reset_credentials(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!("Cleared link credentials at {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(anyhow::anyhow!(
            "Failed to clear credentials {}: {}",
            path.display(),
            e
        )),
    }
}
