//! Test utilities & fixtures shared by the integration tests.

use iceagent::agent::Dispatcher;
use iceagent::device::sim::SYNC_WORD;
use iceagent::device::{FixedTelemetry, SimFpga};
use iceagent::storage::DirStore;

/// Raw divided reading served by the fixture telemetry; the wire value is twice this.
pub const FIXTURE_MILLIVOLTS: u16 = 1650;

pub const IMAGE_FILE: &str = "bitstream.bin";

/// A dispatcher wired to an in-memory FPGA and a temp-dir store.
pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub fpga: SimFpga,
    pub store: DirStore,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DirStore::open(dir.path()).expect("store");
        Self {
            dir,
            fpga: SimFpga::new(true),
            store,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Box::new(self.fpga.clone()),
            Box::new(self.fpga.clone()),
            Box::new(FixedTelemetry::new(FIXTURE_MILLIVOLTS)),
            Box::new(self.store.clone()),
            IMAGE_FILE,
        )
    }
}

/// Header for `code` with the agent's magic, followed by `payload`.
pub fn frame(code: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&(0xCAFE_BEE0 | code).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

pub fn words(ws: &[u32]) -> Vec<u8> {
    ws.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// Plausible bitstream: preamble, sync word, filler.
#[allow(dead_code)] // not every test binary uploads images
pub fn bitstream(len: usize) -> Vec<u8> {
    let mut image = vec![0xFF, 0x00, 0x00, 0xFF];
    image.extend_from_slice(&SYNC_WORD);
    let mut i = 0u8;
    while image.len() < len {
        image.push(i);
        i = i.wrapping_mul(31).wrapping_add(7);
    }
    image
}
