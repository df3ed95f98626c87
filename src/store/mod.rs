//! Row store for pull requests and everything a merge decision reads
//!
//! Two backends share one API: an in-memory map for tests and embedded use,
//! and a JSON file guarded by advisory locks so the `serve` process and CLI
//! invocations can share state.
//!
//! Every write goes through [`Store::transaction`]. The closure works on a
//! private copy of the rows; the copy replaces the stored rows only when the
//! closure returns `Ok`, so an error anywhere rolls back every change it made.

mod data;


pub use data::{Collaborator, StoreData};

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::trace;

use crate::error::{MergeError, Result};
use crate::fs::{locked_read, locked_update};

enum Backend {
    Memory(Mutex<StoreData>),
    File(PathBuf),
}

/// Transactional row store.
pub struct Store {
    backend: Backend,
}

impl Store {
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(Mutex::new(StoreData::default())),
        }
    }

    /// Open a JSON-file store, creating it lazily on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::File(path.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.backend {
            Backend::Memory(_) => None,
            Backend::File(path) => Some(path),
        }
    }

    /// Read-only access to a consistent snapshot.
    pub fn view<T>(&self, read: impl FnOnce(&StoreData) -> Result<T>) -> Result<T> {
        match &self.backend {
            Backend::Memory(lock) => {
                let data = lock
                    .lock()
                    .map_err(|_| MergeError::Store("store lock poisoned".to_string()))?;
                read(&data)
            }
            Backend::File(path) => {
                let data = parse(&locked_read(path)?)?;
                read(&data)
            }
        }
    }

    /// Run `update` atomically; changes are kept only if it returns `Ok`.
    pub fn transaction<T>(&self, update: impl FnOnce(&mut StoreData) -> Result<T>) -> Result<T> {
        match &self.backend {
            Backend::Memory(lock) => {
                let mut data = lock
                    .lock()
                    .map_err(|_| MergeError::Store("store lock poisoned".to_string()))?;
                let mut draft = data.clone();
                let value = update(&mut draft)?;
                *data = draft;
                Ok(value)
            }
            Backend::File(path) => locked_update(path, |current| {
                let mut draft = parse(current)?;
                let value = update(&mut draft)?;
                let json = serde_json::to_string_pretty(&draft)?;
                trace!(path = %path.display(), bytes = json.len(), "store committed");
                Ok((Some(json), value))
            }),
        }
    }
}

fn parse(content: &str) -> Result<StoreData> {
    if content.trim().is_empty() {
        return Ok(StoreData::default());
    }
    Ok(serde_json::from_str(content)?)
}
