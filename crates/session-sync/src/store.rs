//! Sync key stores.
//!
//! A store holds the last successfully synced key. `MemoryStore` lives as
//! long as the process; `FileStore` survives restarts.

use crate::key::SyncKey;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// One slot holding the last synced key.
pub trait KeyStore: Send + Sync {
    fn load(&self) -> Result<Option<SyncKey>, StoreError>;
    fn save(&self, key: &SyncKey) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Volatile store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<SyncKey>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding `key`.
    pub fn with_key(key: SyncKey) -> Self {
        Self {
            slot: Mutex::new(Some(key)),
        }
    }
}

impl KeyStore for MemoryStore {
    fn load(&self) -> Result<Option<SyncKey>, StoreError> {
        let slot = self.slot.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(slot.clone())
    }

    fn save(&self, key: &SyncKey) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().map_err(|_| StoreError::Poisoned)?;
        *slot = Some(key.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().map_err(|_| StoreError::Poisoned)?;
        *slot = None;
        Ok(())
    }
}

/// Store backed by a single file containing the key.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for FileStore {
    fn load(&self) -> Result<Option<SyncKey>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let raw = contents.trim();
                if raw.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(SyncKey::from_stored(raw)))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &SyncKey) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, key.as_str())?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
