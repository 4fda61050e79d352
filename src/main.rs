//! Binary entrypoint for the iceagent CLI.
//!
//! Commands:
//! - `start [--bind <addr>] [--port <n>]` - apply the stored image, then serve the TCP agent
//! - `init` - write a starter `config.toml` and create the data directory
//! - `status` - print the stored image size and CRC as JSON
//! - `crc <file>` - print the CRC-32 of a local image
//! - `send <file> [--persist] [--no-apply]` - upload an image to a running agent
//! - `read-reg <index>` / `write-reg <index> <value>` - FPGA register access
//! - `vbat` - read the battery voltage
//!
//! See the library crate docs for module-level details: `iceagent::`.
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use iceagent::agent::{ConnectionServer, Dispatcher};
use iceagent::boot::{configure_from_store, BootOutcome};
use iceagent::client::Client;
use iceagent::config::Config;
use iceagent::device::{FixedTelemetry, HwmonTelemetry, SimFpga, Telemetry};
use iceagent::link::LinkState;
use iceagent::panel;
use iceagent::protocol::crc32;
use iceagent::storage::{DirStore, FileStore};

const DEFAULT_AGENT_ADDR: &str = "127.0.0.1:3333";

#[derive(Parser)]
#[command(name = "iceagent")]
#[command(about = "Network configuration agent for iCE40 FPGA boards")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the stored image and start the TCP agent
    Start {
        /// Address to bind (overrides config)
        #[arg(short, long)]
        bind: Option<String>,
        /// TCP port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Write a default configuration file
    Init,
    /// Show the stored configuration image
    Status,
    /// Print the CRC-32 of an image file
    Crc { file: PathBuf },
    /// Upload an image to a running agent
    Send {
        file: PathBuf,
        /// Also store the image for the next boot
        #[arg(long)]
        persist: bool,
        /// Do not program the FPGA now
        #[arg(long)]
        no_apply: bool,
        #[arg(short, long, default_value = DEFAULT_AGENT_ADDR)]
        addr: String,
    },
    /// Read an FPGA register
    ReadReg {
        index: u8,
        #[arg(short, long, default_value = DEFAULT_AGENT_ADDR)]
        addr: String,
    },
    /// Write an FPGA register (value is decimal or 0x-prefixed hex)
    WriteReg {
        index: u8,
        #[arg(value_parser = parse_u32)]
        value: u32,
        #[arg(short, long, default_value = DEFAULT_AGENT_ADDR)]
        addr: String,
    },
    /// Read the battery voltage
    Vbat {
        #[arg(short, long, default_value = DEFAULT_AGENT_ADDR)]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init runs before a config exists.
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start { bind, port } => {
            let mut config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_agent(config).await?;
        }
        Commands::Init => {
            info!("Initializing new iceagent configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
            let config = Config::default();
            let store = DirStore::open(&config.storage.data_dir)?;
            info!("Data directory ready at {}", store.root().display());
        }
        Commands::Status => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            let store = DirStore::open(&config.storage.data_dir)?;
            let image_path = config.image_path();
            let image = store.read(&image_path)?;
            let payload = serde_json::json!({
                "data_dir": config.storage.data_dir,
                "image": image_path.display().to_string(),
                "present": image.is_some(),
                "size": image.as_ref().map(|i| i.len()),
                "crc32": image.as_ref().map(|i| format!("0x{:08X}", crc32(i))),
                "apply_at_boot": config.boot.apply_stored_image,
                "listen": format!("{}:{}", config.server.bind, config.server.port),
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Crc { file } => {
            let image = read_image(&file).await?;
            println!("{}: {} bytes, CRC32 = 0x{:08X}", file.display(), image.len(), crc32(&image));
        }
        Commands::Send {
            file,
            persist,
            no_apply,
            addr,
        } => {
            let image = read_image(&file).await?;
            println!("{}: {} bytes, CRC32 = 0x{:08X}", file.display(), image.len(), crc32(&image));
            let mut client = Client::connect(addr.as_str()).await?;
            client.upload(&image, !no_apply, persist).await?;
            if !no_apply {
                println!("FPGA configured");
            }
            if persist {
                println!("Stored on agent at {}", addr);
            }
        }
        Commands::ReadReg { index, addr } => {
            let mut client = Client::connect(addr.as_str()).await?;
            let value = client.read_register(index).await?;
            println!("reg[{}] = 0x{:08X}", index, value);
        }
        Commands::WriteReg { index, value, addr } => {
            let mut client = Client::connect(addr.as_str()).await?;
            client.write_register(index, value).await?;
            println!("reg[{}] <- 0x{:08X}", index, value);
        }
        Commands::Vbat { addr } => {
            let mut client = Client::connect(addr.as_str()).await?;
            println!("{} mV", client.read_battery().await?);
        }
    }

    Ok(())
}

async fn run_agent(config: Config) -> Result<()> {
    info!("Starting iceagent v{}", env!("CARGO_PKG_VERSION"));

    let store = DirStore::open(&config.storage.data_dir)?;
    let fpga = SimFpga::new(config.device.require_sync_word);
    let image_path = config.image_path();

    if config.boot.apply_stored_image {
        let mut programmer = fpga.clone();
        let policy = config.boot.retry_policy();
        match configure_from_store(&store, &mut programmer, &image_path, &policy).await? {
            BootOutcome::NoImage => info!("Waiting for an image from the network"),
            BootOutcome::Configured { attempts, size, crc } => info!(
                "Boot image applied: {} bytes, CRC32 = 0x{:08X}, {} attempt(s)",
                size, crc, attempts
            ),
            BootOutcome::GaveUp { attempts } => {
                warn!("Boot image not applied after {} attempts; serving anyway", attempts)
            }
        }
    } else {
        info!("Boot apply disabled");
    }

    let telemetry: Box<dyn Telemetry + Send> = match &config.telemetry.hwmon_path {
        Some(path) => Box::new(HwmonTelemetry::new(path)),
        None => Box::new(FixedTelemetry::new(config.telemetry.millivolts)),
    };
    let dispatcher = Dispatcher::new(
        Box::new(fpga.clone()),
        Box::new(fpga),
        telemetry,
        Box::new(store),
        image_path,
    );

    // On a host the OS owns the interface, so the link is up from the start.
    let link = LinkState::new();
    link.set_connected(true);

    if let Some(led) = &config.panel.led_output {
        tokio::spawn(panel::blink(
            PathBuf::from(led),
            Duration::from_millis(config.panel.blink_ms),
        ));
    }

    let (reset_tx, reset_rx) = tokio::sync::oneshot::channel::<()>();
    if let Some(input) = &config.panel.reset_input {
        let input = PathBuf::from(input);
        let hold = Duration::from_millis(config.panel.reset_hold_ms);
        let poll = Duration::from_millis(config.panel.poll_ms);
        let credentials = PathBuf::from(&config.link.credentials_file);
        tokio::spawn(async move {
            match panel::watch_reset_input(input, hold, poll, credentials).await {
                Ok(()) => {
                    let _ = reset_tx.send(());
                }
                Err(e) => warn!("Reset input watcher stopped: {}", e),
            }
        });
    }

    let mut server =
        ConnectionServer::bind_when_connected(&link, config.server.clone(), dispatcher).await?;
    server
        .run_until(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Interrupt received"),
                Ok(()) = reset_rx => info!("Reset requested from panel"),
            }
        })
        .await?;
    info!("iceagent stopped");
    Ok(())
}

async fn read_image(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| anyhow!("Failed to read image {}: {}", path.display(), e))
}

fn parse_u32(raw: &str) -> Result<u32, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid value '{}': {}", raw, e))
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });
    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Echo to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
