//! Reconciler
//!
//! Computes the minimal add/update/delete diff between the in-memory
//! collection and the last persisted snapshot and applies it
//! incrementally, instead of clear-and-reinsert. A failed pass is
//! retried once; on the second failure the collection is copied into
//! the legacy store as an emergency backup and the caller is signalled.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::domain::{Entity, PersistenceError, PersistenceResult};
use crate::repository::{set_json, LegacyStore, PersistentStore};

use super::events::{EventBus, PersistenceEvent};

/// Legacy-store key prefix under which a collection's backups live
pub(crate) fn backup_prefix(name: &str) -> String {
    format!("cardall:{}:backup:", name)
}

pub(crate) fn backup_key(name: &str, backup_id: &str) -> String {
    format!("{}{}", backup_prefix(name), backup_id)
}

pub(crate) fn new_backup_id() -> String {
    format!("snapshot-{}", chrono::Local::now().timestamp_millis())
}

/// The minimal set of store operations for one reconciler pass
pub struct Diff<T: Entity> {
    pub to_add: Vec<T>,
    pub to_update: Vec<T>,
    pub to_delete: Vec<T::Id>,
    /// How many of `to_update` actually differ from the baseline
    /// (logging only; the whole intersection is rewritten regardless)
    pub changed: usize,
}

impl<T: Entity> Diff<T> {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }
}

/// Diff the current collection against the persisted baseline
pub fn diff<T: Entity>(current: &[T], baseline: &HashMap<T::Id, T>) -> Diff<T> {
    let mut to_add = Vec::new();
    let mut to_update = Vec::new();
    let mut changed = 0;

    for entity in current {
        match baseline.get(&entity.id()) {
            Some(persisted) => {
                if persisted != entity {
                    changed += 1;
                }
                to_update.push(entity.clone());
            }
            None => to_add.push(entity.clone()),
        }
    }

    let mut to_delete: Vec<T::Id> = baseline
        .keys()
        .filter(|id| !current.iter().any(|e| e.id() == **id))
        .cloned()
        .collect();
    to_delete.sort();

    Diff {
        to_add,
        to_update,
        to_delete,
        changed,
    }
}

/// Counts from a successful reconciler pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl FlushStats {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.deleted == 0
    }
}

pub struct Reconciler<T: Entity> {
    name: String,
    store: Arc<dyn PersistentStore<T>>,
    legacy: Arc<dyn LegacyStore>,
    bus: EventBus,
    /// Last collection state known to be durably written
    baseline: HashMap<T::Id, T>,
}

impl<T: Entity> Reconciler<T> {
    pub fn new(
        name: &str,
        store: Arc<dyn PersistentStore<T>>,
        legacy: Arc<dyn LegacyStore>,
        bus: EventBus,
    ) -> Self {
        Self {
            name: name.to_string(),
            store,
            legacy,
            bus,
            baseline: HashMap::new(),
        }
    }

    /// Set the diff baseline from freshly loaded state
    pub fn seed(&mut self, entities: &[T]) {
        self.baseline = entities.iter().map(|e| (e.id(), e.clone())).collect();
    }

    /// Apply one reconciliation pass for the given snapshot
    ///
    /// Retries once on failure. On the second failure a backup snapshot
    /// goes to the legacy store, `PersistenceDegraded` is published and
    /// the error is returned; the baseline stays untouched so the next
    /// pass re-attempts the same diff.
    pub async fn apply(&mut self, snapshot: &[T]) -> PersistenceResult<FlushStats> {
        let d = diff(snapshot, &self.baseline);
        if d.is_empty() {
            debug!("[{}] reconcile: no-op diff", self.name);
            return Ok(FlushStats::default());
        }

        let stats = FlushStats {
            added: d.to_add.len(),
            updated: d.to_update.len(),
            deleted: d.to_delete.len(),
        };

        let mut result = self
            .store
            .bulk_write(&d.to_add, &d.to_update, &d.to_delete)
            .await;
        if let Err(e) = &result {
            warn!("[{}] reconcile pass failed, retrying once: {}", self.name, e);
            result = self
                .store
                .bulk_write(&d.to_add, &d.to_update, &d.to_delete)
                .await;
        }

        match result {
            Ok(()) => {
                self.baseline = snapshot.iter().map(|e| (e.id(), e.clone())).collect();
                info!(
                    "[{}] reconciled: +{} ~{} ({} changed) -{}",
                    self.name, stats.added, stats.updated, d.changed, stats.deleted
                );
                self.bus.publish(PersistenceEvent::FlushCompleted {
                    collection: self.name.clone(),
                    added: stats.added,
                    updated: stats.updated,
                    deleted: stats.deleted,
                });
                Ok(stats)
            }
            Err(e) => {
                let backup_id = self.write_backup(snapshot).await;
                error!(
                    "[{}] reconcile failed twice, backup {:?} written: {}",
                    self.name, backup_id, e
                );
                self.bus.publish(PersistenceEvent::PersistenceDegraded {
                    collection: self.name.clone(),
                    backup_id: backup_id.unwrap_or_default(),
                    reason: e.to_string(),
                });
                Err(PersistenceError::ReconciliationFailed(e.to_string()))
            }
        }
    }

    /// Write an emergency copy of the snapshot to the legacy store
    async fn write_backup(&self, snapshot: &[T]) -> Option<String> {
        let backup_id = new_backup_id();
        let key = backup_key(&self.name, &backup_id);
        match set_json(self.legacy.as_ref(), &key, &snapshot).await {
            Ok(()) => Some(backup_id),
            Err(e) => {
                error!("[{}] emergency backup write failed: {}", self.name, e);
                None
            }
        }
    }
}
