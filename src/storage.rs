//! Persistent local key/value storage
//!
//! The gate persists three string keys per installation (device id, cached
//! authorization, last check timestamp). On the host they live in a single
//! JSON document; writes go through a temp file and a rename so a crash
//! never leaves a half-written document behind. A document that does not
//! parse is moved aside to `gate_store.json.corrupt` and treated as empty.
//!
//! There is no cross-process coordination: two launches racing on the same
//! document resolve as last-writer-wins.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::StorageError;

pub const DEVICE_ID_KEY: &str = "device-id";
pub const CACHED_AUTHORIZATION_KEY: &str = "cached-authorization";
pub const LAST_CHECK_KEY: &str = "last-check-timestamp";

const STORE_FILE_NAME: &str = "gate_store.json";
const CORRUPT_EXTENSION: &str = "json.corrupt";

/// String key/value storage in the shape of browser local storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// File-backed store: one JSON object mapping keys to string values.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store living at `<data_dir>/gate_store.json`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::at_path(data_dir.join(STORE_FILE_NAME))
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<BTreeMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str(&raw) {
            Ok(doc) => Ok(doc),
            Err(err) => {
                // Start over from an empty document; the next write replaces it
                let aside = self.path.with_extension(CORRUPT_EXTENSION);
                warn!(
                    "Store {} unreadable ({err}), moving it to {}",
                    self.path.display(),
                    aside.display()
                );
                if let Err(err) = fs::rename(&self.path, &aside) {
                    warn!("Could not move corrupt store aside: {err}");
                }
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_document(&self, doc: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_vec_pretty(doc)?;
        atomic_write(&self.path, &serialized)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_document()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut doc = self.read_document()?;
        doc.insert(key.to_string(), value.to_string());
        self.write_document(&doc)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut doc = self.read_document()?;
        if doc.remove(key).is_some() {
            self.write_document(&doc)?;
        }
        Ok(())
    }
}

/// In-memory store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(tmp, path)?;
    Ok(())
}
