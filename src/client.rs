//! Host-side client for the configuration agent.
//!
//! ```rust,no_run
//! use iceagent::client::Client;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut client = Client::connect("192.168.4.1:3333").await?;
//!     let image = std::fs::read("top.bin")?;
//!     client.persist_image(&image).await?;
//!     client.apply_image(&image).await?;
//!     println!("battery: {} mV", client.read_battery().await?);
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, bail, Result};
use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::protocol::{Command, Header, Reply, Status};

pub struct Client {
    stream: TcpStream,
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| anyhow!("Failed to connect: {}", e))?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Send one message and wait for its reply. The reply status is returned
    /// as-is; use the typed helpers to turn failure bits into errors.
    pub async fn request(&mut self, command: Command, payload: &[u8]) -> Result<Reply> {
        let length = u32::try_from(payload.len())
            .map_err(|_| anyhow!("Payload of {} bytes does not fit a u32 length", payload.len()))?;
        let header = Header::new(command, length);
        self.stream.write_all(&header.encode()).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;

        // A wrong-header reply is always a single byte, so read the status first.
        let mut reply = [0u8; 5];
        self.stream.read_exact(&mut reply[..1]).await?;
        let status = Status::from_byte(reply[0]);
        let len = if command.returns_value() && !status.contains(Status::WRONG_HEADER) {
            self.stream.read_exact(&mut reply[1..]).await?;
            5
        } else {
            1
        };
        debug!("{:?} -> {:02X?}", command, &reply[..len]);
        if len == 1 && command.returns_value() {
            return Ok(Reply::status_only(status));
        }
        Ok(Reply::parse(command, &reply[..len])?)
    }

    async fn expect_ok(&mut self, command: Command, payload: &[u8]) -> Result<Option<u32>> {
        let reply = self.request(command, payload).await?;
        if !reply.status.is_ok() {
            bail!("{:?} failed with status 0x{:02X} ({:?})", command, reply.status.to_byte(), reply.status);
        }
        Ok(reply.value)
    }

    async fn expect_value(&mut self, command: Command, payload: &[u8]) -> Result<u32> {
        self.expect_ok(command, payload)
            .await?
            .ok_or_else(|| anyhow!("{:?} reply carried no value", command))
    }

    pub async fn read_register(&mut self, index: u8) -> Result<u32> {
        self.expect_value(Command::ReadRegister, &u32::from(index).to_le_bytes())
            .await
    }

    pub async fn write_register(&mut self, index: u8, value: u32) -> Result<()> {
        let mut payload = [0u8; 8];
        payload[..4].copy_from_slice(&u32::from(index).to_le_bytes());
        payload[4..].copy_from_slice(&value.to_le_bytes());
        self.expect_ok(Command::WriteRegister, &payload).await?;
        Ok(())
    }

    /// Battery voltage in millivolts, already scaled by the agent.
    pub async fn read_battery(&mut self) -> Result<u32> {
        self.expect_value(Command::ReadTelemetry, &[]).await
    }

    pub async fn persist_image(&mut self, image: &[u8]) -> Result<()> {
        self.expect_ok(Command::PersistConfig, image).await?;
        Ok(())
    }

    pub async fn apply_image(&mut self, image: &[u8]) -> Result<()> {
        self.expect_ok(Command::ApplyConfig, image).await?;
        Ok(())
    }

    /// Apply and/or store `image`. When both are requested the image is
    /// stored only after the device accepted it, so a rejected image never
    /// becomes the boot image.
    pub async fn upload(&mut self, image: &[u8], apply: bool, persist: bool) -> Result<()> {
        if apply {
            self.apply_image(image)
                .await
                .map_err(|e| anyhow!("Image rejected, not stored: {}", e))?;
        }
        if persist {
            self.persist_image(image).await?;
        }
        Ok(())
    }
}
