//! Persistence Engine
//!
//! Per-collection composition of migration controller, reconciler,
//! debounced writer and consistency checker. The engine owns the
//! canonical in-memory collection; mutations update it and schedule a
//! debounced flush.

use std::sync::Arc;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::{Collection, Entity, PersistenceResult};
use crate::repository::{LegacyStore, PersistentStore};

use super::checker::ConsistencyChecker;
use super::events::EventBus;
use super::migration::{MigrationController, MigrationOutcome};
use super::reconcile::Reconciler;
use super::writer::DebouncedWriter;

/// Tuning knobs for one engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Debounce quiet period before a flush
    pub quiet_period: Duration,
    /// Consistency check interval
    pub check_interval: Duration,
    /// Schedule a forced flush when the checker finds drift
    pub self_heal: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(800),
            check_interval: Duration::from_secs(30),
            self_heal: true,
        }
    }
}

/// Which backend is authoritative for this session
///
/// The transition is one-directional: once `Migrated`, the engine never
/// flaps back to the legacy store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreMode {
    /// Persistent store is authoritative
    Migrated,
    /// Migration failed this session; legacy content backs the state
    Degraded,
}

pub struct PersistenceEngine<T: Entity> {
    name: String,
    collection: Arc<RwLock<Collection<T>>>,
    writer: DebouncedWriter<T>,
    checker: ConsistencyChecker,
    pub(crate) store: Arc<dyn PersistentStore<T>>,
    pub(crate) legacy: Arc<dyn LegacyStore>,
    pub(crate) bus: EventBus,
    mode: StoreMode,
}

impl<T: Entity> PersistenceEngine<T> {
    /// Run migration, load initial state and start the background tasks
    pub async fn init(
        name: &str,
        store: Arc<dyn PersistentStore<T>>,
        legacy: Arc<dyn LegacyStore>,
        bus: EventBus,
        config: &EngineConfig,
    ) -> PersistenceResult<Self> {
        let migration =
            MigrationController::new(name, legacy.clone(), store.clone(), bus.clone());

        let (initial, mode) = match migration.run().await? {
            // Load from the store after a fresh migration too, not from
            // the legacy payload: a re-run after a failed flag write
            // must pick up rows persisted since that session.
            MigrationOutcome::AlreadyMigrated | MigrationOutcome::Migrated(_) => {
                (store.read_all().await?, StoreMode::Migrated)
            }
            MigrationOutcome::Degraded(entities) => (entities, StoreMode::Degraded),
        };
        info!("[{}] engine starting with {} entities ({:?})", name, initial.len(), mode);

        let collection = Arc::new(RwLock::new(Collection::from_entities(initial.clone())));

        let mut reconciler = Reconciler::new(name, store.clone(), legacy.clone(), bus.clone());
        // In degraded mode nothing is known to be durably written, so the
        // baseline stays empty and the next pass re-adds everything.
        if mode == StoreMode::Migrated {
            reconciler.seed(&initial);
        }
        let writer = DebouncedWriter::spawn(name, config.quiet_period, reconciler);

        let heal = config.self_heal.then(|| writer.sender());
        let checker = ConsistencyChecker::spawn(
            name,
            config.check_interval,
            store.clone(),
            collection.clone(),
            bus.clone(),
            heal,
        );

        Ok(Self {
            name: name.to_string(),
            collection,
            writer,
            checker,
            store,
            legacy,
            bus,
            mode,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Insert or replace an entity and schedule a flush
    pub async fn upsert(&self, entity: T) {
        let snapshot = {
            let mut guard = self.collection.write().await;
            guard.upsert(entity);
            guard.snapshot()
        };
        self.writer.schedule(snapshot);
    }

    /// Remove an entity and schedule a flush; returns whether it existed
    pub async fn remove(&self, id: &T::Id) -> bool {
        let (removed, snapshot) = {
            let mut guard = self.collection.write().await;
            let removed = guard.remove(id);
            (removed, guard.snapshot())
        };
        if removed {
            self.writer.schedule(snapshot);
        }
        removed
    }

    /// Replace the whole collection and schedule a flush
    pub async fn replace_all(&self, entities: Vec<T>) {
        let snapshot = {
            let mut guard = self.collection.write().await;
            guard.replace_all(entities);
            guard.snapshot()
        };
        self.writer.schedule(snapshot);
    }

    pub async fn get(&self, id: &T::Id) -> Option<T> {
        self.collection.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.collection.read().await.len()
    }

    /// Cloned snapshot of the current in-memory state
    pub async fn snapshot(&self) -> Vec<T> {
        self.collection.read().await.snapshot()
    }

    /// Schedule a flush of the current state without mutating it
    pub async fn schedule_flush(&self) {
        let snapshot = self.collection.read().await.snapshot();
        self.writer.schedule(snapshot);
    }

    pub(crate) fn collection(&self) -> &Arc<RwLock<Collection<T>>> {
        &self.collection
    }

    pub(crate) fn set_mode(&mut self, mode: StoreMode) {
        self.mode = mode;
    }

    /// Stop the checker, then close the writer (final flush included)
    pub async fn shutdown(self) {
        // Checker first: it holds a writer sender, which must drop
        // before the writer channel can close.
        self.checker.shutdown().await;
        self.writer.shutdown().await;
        info!("[{}] engine shut down", self.name);
    }
}
