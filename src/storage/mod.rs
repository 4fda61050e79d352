//! # Storage Module - Configuration Image Persistence
//!
//! Host stand-in for the board's flash filesystem. The agent keeps a single
//! well-known file, the boot-time configuration image, plus whatever small
//! files the link layer needs (credentials).
//!
//! ```text
//! data/
//! ├── bitstream.bin        ← image applied at boot (PersistConfig writes it)
//! └── link-credentials     ← erased by the reset button
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use iceagent::storage::{DirStore, FileStore};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut store = DirStore::open("./data")?;
//!     store.write(Path::new("bitstream.bin"), &[0x7E, 0xAA, 0x99, 0x7E])?;
//!     let image = store.read(Path::new("bitstream.bin"))?;
//!     assert!(image.is_some());
//!     Ok(())
//! }
//! ```
//!
//! Writes go to a temp file in the same directory which then replaces the
//! destination, so a power cut never leaves a half-written image behind.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Path is absolute or escapes the store root.
    #[error("invalid store path: {0}")]
    InvalidPath(String),
}

/// Flash-backed file store interface.
pub trait FileStore {
    fn write(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StoreError>;

    /// Returns `Ok(None)` when the file does not exist.
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StoreError>;
}

/// File store rooted at a directory on the host filesystem.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a store-relative path, refusing anything that could leave the root.
    fn resolve(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let mut has_name = false;
        for component in path.components() {
            match component {
                Component::Normal(_) => has_name = true,
                Component::CurDir => {}
                _ => return Err(StoreError::InvalidPath(path.display().to_string())),
            }
        }
        if !has_name {
            return Err(StoreError::InvalidPath(path.display().to_string()));
        }
        Ok(self.root.join(path))
    }
}

impl FileStore for DirStore {
    fn write(&mut self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let dest = self.resolve(path)?;
        let dir = dest.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&dir)?;
        let base = dest
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("data.bin");

        let mut counter = 0u32;
        let tmp_path = loop {
            let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
            match OpenOptions::new().write(true).create_new(true).open(&candidate) {
                Ok(mut tmp) => {
                    tmp.write_all(bytes)?;
                    tmp.flush()?;
                    tmp.sync_all()?;
                    break candidate;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    counter = counter.saturating_add(1);
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = fs::rename(&tmp_path, &dest) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        // Persist the rename; not all platforms allow syncing a directory.
        if let Ok(dir_file) = File::open(&dir) {
            let _ = dir_file.sync_all();
        }
        debug!("store wrote {} bytes to {}", bytes.len(), dest.display());
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        let src = self.resolve(path)?;
        match fs::read(&src) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
