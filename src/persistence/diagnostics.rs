//! Diagnostic Surface
//!
//! Manual-recovery and inspection tooling: status, report, storage
//! reset, forced migration, snapshot create/restore. None of this runs
//! as part of normal operation.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::domain::{Entity, PersistenceError, PersistenceResult};
use crate::repository::{get_json, set_json};

use super::engine::{PersistenceEngine, StoreMode};
use super::migration::{data_key, flag_key, MigrationController, MigrationOutcome};
use super::reconcile::{backup_key, backup_prefix, new_backup_id};

/// Point-in-time status of one engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub collection: String,
    pub mode: StoreMode,
    pub migrated: bool,
    /// Entities held in memory
    pub in_memory: usize,
    /// Entities readable from the persistent store, if it answered
    pub persisted: Option<usize>,
    /// Backup snapshot ids available in the legacy store
    pub backups: Vec<String>,
}

impl<T: Entity> PersistenceEngine<T> {
    /// Current status of this engine
    pub async fn status(&self) -> EngineStatus {
        let migrated = matches!(
            get_json::<bool>(self.legacy.as_ref(), &flag_key(self.name())).await,
            Ok(Some(true))
        );
        let persisted = match self.store.read_all().await {
            Ok(entities) => Some(entities.len()),
            Err(e) => {
                warn!("[{}] status: store read failed: {}", self.name(), e);
                None
            }
        };
        EngineStatus {
            collection: self.name().to_string(),
            mode: self.mode(),
            migrated,
            in_memory: self.len().await,
            persisted,
            backups: self.list_snapshots().await.unwrap_or_default(),
        }
    }

    /// Human-readable status block for this engine
    pub async fn report_section(&self) -> String {
        let status = self.status().await;
        let persisted = status
            .persisted
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unavailable".to_string());
        format!(
            "[{}]\n  mode: {:?}\n  migrated: {}\n  in memory: {}\n  persisted: {}\n  backups: {}\n",
            status.collection,
            status.mode,
            status.migrated,
            status.in_memory,
            persisted,
            if status.backups.is_empty() {
                "none".to_string()
            } else {
                status.backups.join(", ")
            }
        )
    }

    /// Wipe this collection everywhere: persistent rows, in-memory
    /// state, legacy payload and backups. The migration flag survives.
    pub async fn clear_storage(&self) -> PersistenceResult<()> {
        self.store.clear().await?;
        self.collection().write().await.clear();
        self.legacy.remove(&data_key(self.name())).await?;
        for backup_id in self.list_snapshots().await? {
            self.legacy
                .remove(&backup_key(self.name(), &backup_id))
                .await?;
        }
        warn!("[{}] storage cleared", self.name());
        Ok(())
    }

    /// Reset the migration flag and re-run the migration
    ///
    /// The only supported way to clear the flag. Replaces the in-memory
    /// collection with the migrated content and returns its size.
    pub async fn force_migration(&mut self) -> PersistenceResult<usize> {
        let migration = MigrationController::new(
            self.name(),
            self.legacy.clone(),
            self.store.clone(),
            self.bus.clone(),
        );
        let (entities, mode) = match migration.force().await? {
            MigrationOutcome::AlreadyMigrated => {
                // force() clears the flag first, so this cannot happen
                (self.store.read_all().await?, StoreMode::Migrated)
            }
            MigrationOutcome::Migrated(entities) => (entities, StoreMode::Migrated),
            MigrationOutcome::Degraded(entities) => (entities, StoreMode::Degraded),
        };
        self.set_mode(mode);
        let count = entities.len();
        self.replace_all(entities).await;
        Ok(count)
    }

    /// Write a manual backup snapshot of the current state
    pub async fn create_snapshot(&self) -> PersistenceResult<String> {
        let backup_id = new_backup_id();
        let snapshot = self.snapshot().await;
        set_json(
            self.legacy.as_ref(),
            &backup_key(self.name(), &backup_id),
            &snapshot,
        )
        .await?;
        Ok(backup_id)
    }

    /// Replace the in-memory state from a backup snapshot and schedule
    /// a flush; returns the number of restored entities
    pub async fn restore_snapshot(&self, backup_id: &str) -> PersistenceResult<usize> {
        let key = backup_key(self.name(), backup_id);
        let entities: Vec<T> = get_json(self.legacy.as_ref(), &key)
            .await?
            .ok_or_else(|| {
                PersistenceError::InvalidInput(format!("no such snapshot: {}", backup_id))
            })?;
        let count = entities.len();
        self.replace_all(entities).await;
        Ok(count)
    }

    /// Backup snapshot ids available for this collection
    pub async fn list_snapshots(&self) -> PersistenceResult<Vec<String>> {
        let prefix = backup_prefix(self.name());
        let mut ids: Vec<String> = self
            .legacy
            .keys()
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(|id| id.to_string()))
            .collect();
        ids.sort();
        Ok(ids)
    }
}
