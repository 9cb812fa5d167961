//! Legacy Store Implementation
//!
//! A JSON-file key-value store standing in for the browser's simple
//! key-value storage. Only read in anger during one-time migration;
//! afterwards it holds the migration flag and emergency backups.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use tokio::sync::Mutex;

use crate::domain::{PersistenceError, PersistenceResult};

use super::traits::LegacyStore;

/// Key-value store persisted as a single JSON file
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store, loading existing content if the file is present
    ///
    /// A missing file is an empty store. An unreadable or unparseable
    /// file is an error; silently starting empty would make a later
    /// migration pass look complete while dropping legacy data.
    pub fn open(path: &Path) -> PersistenceResult<Self> {
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                PersistenceError::StoreUnavailable(format!("Failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                PersistenceError::StoreUnavailable(format!("Corrupt legacy store {}: {}", path.display(), e))
            })?
        } else {
            debug!("legacy store {} not found, starting empty", path.display());
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> PersistenceResult<()> {
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|e| PersistenceError::Internal(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| {
            PersistenceError::Internal(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl LegacyStore for JsonFileStore {
    async fn get_raw(&self, key: &str) -> PersistenceResult<Option<String>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: &str) -> PersistenceResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    async fn remove(&self, key: &str) -> PersistenceResult<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }

    async fn keys(&self) -> PersistenceResult<Vec<String>> {
        let entries = self.entries.lock().await;
        Ok(entries.keys().cloned().collect())
    }
}
