//! Connection server: one listener, one connection at a time.
//!
//! ```rust,no_run
//! use iceagent::agent::{ConnectionServer, Dispatcher};
//! use iceagent::config::Config;
//! # fn make_dispatcher() -> Dispatcher { unimplemented!() }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let mut server = ConnectionServer::bind(config.server.clone(), make_dispatcher()).await?;
//!     server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use socket2::{SockRef, TcpKeepalive};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;

use super::dispatch::Dispatch;
use super::session::{run_session, SessionConfig};
use crate::config::ServerConfig;
use crate::link::LinkState;
use crate::metrics;

pub struct ConnectionServer<D> {
    listener: TcpListener,
    dispatcher: D,
    config: ServerConfig,
}

impl<D: Dispatch> ConnectionServer<D> {
    pub async fn bind(config: ServerConfig, dispatcher: D) -> Result<Self> {
        let listener = TcpListener::bind((config.bind.as_str(), config.port))
            .await
            .map_err(|e| anyhow!("Socket unable to bind {}:{}: {}", config.bind, config.port, e))?;
        info!("Socket bound, {}", listener.local_addr()?);
        Ok(Self {
            listener,
            dispatcher,
            config,
        })
    }

    /// Wait for the link to come up, then bind.
    pub async fn bind_when_connected(
        link: &LinkState,
        config: ServerConfig,
        dispatcher: D,
    ) -> Result<Self> {
        if !link.is_connected() {
            info!("Waiting for link before starting TCP server");
            link.wait_connected().await;
        }
        Self::bind(config, dispatcher).await
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve connections one after another until `shutdown` resolves.
    /// A session in progress is dropped at shutdown.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let session_config = SessionConfig {
            read_buffer_bytes: self.config.read_buffer_bytes,
            max_payload: self.config.max_payload(),
        };

        loop {
            debug!("Socket listening");
            let (mut stream, addr) = tokio::select! {
                _ = &mut shutdown => {
                    info!("TCP server shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!("Unable to accept connection: {} - continuing", e);
                        sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                },
            };

            metrics::inc_connections_accepted();
            if let Err(e) = set_keepalive(&stream, &self.config) {
                warn!("Failed to set keepalive for {}: {}", addr, e);
            }
            let peer = addr.to_string();
            info!("Socket accepted ip address: {}", peer);

            let session = run_session(&mut stream, &peer, &mut self.dispatcher, session_config);
            let result = tokio::select! {
                _ = &mut shutdown => {
                    info!("TCP server shutting down, dropping connection {}", peer);
                    return Ok(());
                }
                result = session => result,
            };
            match result {
                Ok(summary) => debug!("Session {} finished: {:?}", peer, summary),
                Err(e) => warn!("Error on connection {}: {}", peer, e),
            }
            let _ = stream.shutdown().await;
            debug!("Counters: {:?}", metrics::snapshot());
        }
    }
}

/// Apply the configured TCP keepalive to an accepted connection.
pub fn set_keepalive(stream: &TcpStream, config: &ServerConfig) -> std::io::Result<()> {
    let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(config.keepalive_idle_secs));
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    let keepalive = keepalive
        .with_interval(Duration::from_secs(config.keepalive_interval_secs))
        .with_retries(config.keepalive_count);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}
