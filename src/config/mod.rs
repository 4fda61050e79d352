//! # Configuration Management Module
//!
//! TOML configuration for the agent, loaded once at startup.
//!
//! ## Configuration Structure
//!
//! - [`ServerConfig`] - listener address, payload limit, TCP keepalive
//! - [`StorageConfig`] - data directory and configuration image name
//! - [`DeviceConfig`] - target device backend settings
//! - [`TelemetryConfig`] - battery voltage source
//! - [`BootConfig`] - boot-time image apply and retry policy
//! - [`LinkConfig`] - link credentials location
//! - [`PanelConfig`] - reset button and status LED
//! - [`LoggingConfig`] - log level and file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use iceagent::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml").await?;
//!     let config = Config::load("config.toml").await?;
//!     println!("Listening on {}:{}", config.server.bind, config.server.port);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 3333
//! max_payload_bytes = 4194304   # 0 = no limit
//!
//! [storage]
//! data_dir = "./data"
//! image_file = "bitstream.bin"
//!
//! [boot]
//! apply_stored_image = true
//! # max_attempts = 10          # omit to retry until the device accepts the image
//! ```
//!
//! Every section except `[server]`, `[storage]` and `[logging]` may be omitted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::boot::RetryPolicy;
use crate::protocol::DEFAULT_PORT;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub boot: BootConfig,
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub panel: PanelConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Largest declared payload the receiver will allocate for. 0 disables the limit.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    #[serde(default = "default_read_buffer_bytes")]
    pub read_buffer_bytes: usize,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_idle_secs: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_keepalive_count")]
    pub keepalive_count: u32,
}

fn default_max_payload_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_read_buffer_bytes() -> usize {
    1024
}

fn default_keepalive_secs() -> u64 {
    5
}

fn default_keepalive_count() -> u32 {
    3
}

impl ServerConfig {
    pub fn max_payload(&self) -> Option<usize> {
        (self.max_payload_bytes > 0).then_some(self.max_payload_bytes)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_payload_bytes: default_max_payload_bytes(),
            read_buffer_bytes: default_read_buffer_bytes(),
            keepalive_idle_secs: default_keepalive_secs(),
            keepalive_interval_secs: default_keepalive_secs(),
            keepalive_count: default_keepalive_count(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Store-relative name of the boot-time configuration image.
    #[serde(default = "default_image_file")]
    pub image_file: String,
}

fn default_image_file() -> String {
    "bitstream.bin".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Reject images without the iCE40 sync word before "programming".
    #[serde(default = "default_true")]
    pub require_sync_word: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            require_sync_word: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Divided battery reading reported when no hwmon input is configured.
    #[serde(default = "default_millivolts")]
    pub millivolts: u16,
    /// hwmon voltage input, e.g. `/sys/class/hwmon/hwmon0/in0_input`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hwmon_path: Option<String>,
}

fn default_millivolts() -> u16 {
    1850
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            millivolts: default_millivolts(),
            hwmon_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootConfig {
    #[serde(default = "default_true")]
    pub apply_stored_image: bool,
    /// Give up after this many attempts. Absent: keep retrying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    5000
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            apply_stored_image: true,
            max_attempts: None,
            backoff_ms: default_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl BootConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.backoff_ms)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Credentials erased by a long press of the reset button.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
}

fn default_credentials_file() -> String {
    "./data/link-credentials".to_string()
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
        }
    }
}

/// Front panel wiring through sysfs GPIO value files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Active-low reset button, e.g. `/sys/class/gpio/gpio9/value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_input: Option<String>,
    #[serde(default = "default_reset_hold_ms")]
    pub reset_hold_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    /// Status LED, e.g. `/sys/class/leds/status/brightness`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub led_output: Option<String>,
    #[serde(default = "default_blink_ms")]
    pub blink_ms: u64,
}

fn default_reset_hold_ms() -> u64 {
    3000
}

fn default_poll_ms() -> u64 {
    10
}

fn default_blink_ms() -> u64 {
    1000
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            reset_input: None,
            reset_hold_ms: default_reset_hold_ms(),
            poll_ms: default_poll_ms(),
            led_output: None,
            blink_ms: default_blink_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Store-relative path of the configuration image.
    pub fn image_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.image_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                image_file: default_image_file(),
            },
            device: DeviceConfig::default(),
            telemetry: TelemetryConfig::default(),
            boot: BootConfig::default(),
            link: LinkConfig::default(),
            panel: PanelConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("iceagent.log".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.server.port, 3333);
        assert_eq!(config.server.keepalive_idle_secs, 5);
        assert_eq!(config.server.keepalive_interval_secs, 5);
        assert_eq!(config.server.keepalive_count, 3);
        assert_eq!(config.storage.image_file, "bitstream.bin");
        assert_eq!(config.panel.reset_hold_ms, 3000);
        assert!(config.boot.max_attempts.is_none());
    }

    #[test]
    fn zero_payload_limit_means_unbounded() {
        let mut server = ServerConfig::default();
        assert_eq!(server.max_payload(), Some(4 * 1024 * 1024));
        server.max_payload_bytes = 0;
        assert_eq!(server.max_payload(), None);
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let text = r#"
            [server]
            bind = "127.0.0.1"
            port = 4444

            [storage]
            data_dir = "/var/lib/iceagent"

            [logging]
            level = "debug"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.server.port, 4444);
        assert_eq!(config.server.read_buffer_bytes, 1024);
        assert_eq!(config.storage.image_file, "bitstream.bin");
        assert!(config.device.require_sync_word);
        assert!(config.panel.reset_input.is_none());
        assert_eq!(config.logging.file, None);
    }

    #[test]
    fn retry_policy_from_boot_section() {
        let boot = BootConfig {
            apply_stored_image: true,
            max_attempts: Some(4),
            backoff_ms: 100,
            max_backoff_ms: 50,
        };
        let policy = boot.retry_policy();
        assert_eq!(policy.max_attempts, Some(4));
        assert_eq!(policy.backoff, Duration::from_millis(100));
        // Cap never below the initial backoff.
        assert_eq!(policy.max_backoff, Duration::from_millis(100));
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.port, 3333);
        assert_eq!(parsed.logging.file.as_deref(), Some("iceagent.log"));
    }

    #[tokio::test]
    async fn create_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let config = Config::load(path).await.unwrap();
        assert_eq!(config.server.bind, "0.0.0.0");
    }
}
