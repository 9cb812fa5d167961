//! Migration Controller
//!
//! One-time, idempotent transfer of a collection from the legacy store
//! to the persistent store, gated by a persisted completion flag. The
//! flag write is the commit point: on partial failure the flag stays
//! unset and the migration is retried on the next load, which is safe
//! because the bulk write is overwrite-idempotent.

use std::sync::Arc;

use log::{error, info, warn};

use crate::domain::{Entity, PersistenceResult};
use crate::repository::{get_json, set_json, LegacyStore, PersistentStore};

use super::events::{EventBus, PersistenceEvent};

/// Legacy-store key holding a collection's entities
pub(crate) fn data_key(name: &str) -> String {
    format!("cardall:{}", name)
}

/// Legacy-store key holding a collection's migration flag
pub(crate) fn flag_key(name: &str) -> String {
    format!("cardall:{}:migrated", name)
}

/// How an engine starts up after the migration check
pub enum MigrationOutcome<T> {
    /// Flag already set: the persistent store is authoritative
    AlreadyMigrated,
    /// Legacy content was transferred this session
    Migrated(Vec<T>),
    /// Migration failed; legacy content backs this session (flag unset)
    Degraded(Vec<T>),
}

pub struct MigrationController<T: Entity> {
    name: String,
    legacy: Arc<dyn LegacyStore>,
    store: Arc<dyn PersistentStore<T>>,
    bus: EventBus,
}

impl<T: Entity> MigrationController<T> {
    pub fn new(
        name: &str,
        legacy: Arc<dyn LegacyStore>,
        store: Arc<dyn PersistentStore<T>>,
        bus: EventBus,
    ) -> Self {
        Self {
            name: name.to_string(),
            legacy,
            store,
            bus,
        }
    }

    /// Whether the completion flag is set
    pub async fn is_migrated(&self) -> bool {
        matches!(
            get_json::<bool>(self.legacy.as_ref(), &flag_key(&self.name)).await,
            Ok(Some(true))
        )
    }

    /// Run the one-time migration if it has not completed yet
    ///
    /// Fails soft: any read/write error leaves the flag unset and
    /// resolves to `Degraded` with whatever legacy content could be
    /// read, so the session still has data.
    pub async fn run(&self) -> PersistenceResult<MigrationOutcome<T>> {
        if self.is_migrated().await {
            return Ok(MigrationOutcome::AlreadyMigrated);
        }

        let entities = match get_json::<Vec<T>>(self.legacy.as_ref(), &data_key(&self.name)).await
        {
            Ok(Some(entities)) => entities,
            Ok(None) => Vec::new(),
            Err(e) => {
                error!("[{}] legacy read failed during migration: {}", self.name, e);
                return Ok(MigrationOutcome::Degraded(Vec::new()));
            }
        };

        if let Err(e) = self.store.bulk_write(&entities, &[], &[]).await {
            error!(
                "[{}] bulk write failed during migration, staying on legacy store: {}",
                self.name, e
            );
            return Ok(MigrationOutcome::Degraded(entities));
        }

        // Commit point. A failed flag write just means we re-run next load.
        if let Err(e) = set_json(self.legacy.as_ref(), &flag_key(&self.name), &true).await {
            warn!(
                "[{}] migration succeeded but flag write failed, will re-run: {}",
                self.name, e
            );
        }

        info!("[{}] migrated {} entities from legacy store", self.name, entities.len());
        self.bus.publish(PersistenceEvent::MigrationCompleted {
            collection: self.name.clone(),
            migrated: entities.len(),
        });

        Ok(MigrationOutcome::Migrated(entities))
    }

    /// Clear the completion flag and run the migration again
    ///
    /// Manual recovery only; normal operation never resets the flag.
    pub async fn force(&self) -> PersistenceResult<MigrationOutcome<T>> {
        self.legacy.remove(&flag_key(&self.name)).await?;
        warn!("[{}] migration flag cleared, re-running migration", self.name);
        self.run().await
    }
}
