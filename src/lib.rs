//! # iceagent - network configuration agent for an FPGA board
//!
//! iceagent runs on the microcontroller side of a small FPGA board. A host
//! connects over TCP and sends framed commands to read and write FPGA
//! registers, read the battery voltage, store a configuration image, and
//! program the FPGA with it. At startup the stored image is applied before the
//! server comes up.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use iceagent::agent::{ConnectionServer, Dispatcher};
//! use iceagent::device::{FixedTelemetry, SimFpga};
//! use iceagent::storage::DirStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = iceagent::config::Config::load("config.toml").await?;
//!     let fpga = SimFpga::new(config.device.require_sync_word);
//!     let dispatcher = Dispatcher::new(
//!         Box::new(fpga.clone()),
//!         Box::new(fpga),
//!         Box::new(FixedTelemetry::new(config.telemetry.millivolts)),
//!         Box::new(DirStore::open(&config.storage.data_dir)?),
//!         config.image_path(),
//!     );
//!     let mut server = ConnectionServer::bind(config.server.clone(), dispatcher).await?;
//!     server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`protocol`] - wire format: header, commands, status bits, replies, CRC-32
//! - [`agent`] - frame receiver, command dispatcher, TCP session and server
//! - [`device`] - register bus, programmer and telemetry seams plus host backends
//! - [`storage`] - flat file store for the configuration image
//! - [`boot`] - apply the stored image at startup with retry
//! - [`link`] - network link state and credential reset
//! - [`panel`] - reset button long-press and status LED
//! - [`client`] - host-side client
//! - [`config`] - TOML configuration
//!
//! ```text
//! TCP bytes ──► FrameReceiver ──► Dispatcher ──► RegisterBus / Programmer
//!                    │                 │              Telemetry / FileStore
//!                    ◄──── Reply ◄─────┘
//! ```

pub mod agent;
pub mod boot;
pub mod client;
pub mod config;
pub mod device;
pub mod link;
pub mod logutil;
pub mod metrics;
pub mod panel;
pub mod protocol;
pub mod storage;
