//! Consistency Checker
//!
//! Recurring background comparison of the persisted id set against the
//! in-memory collection. Drift is logged and published; when
//! self-healing is enabled a forced flush of the current snapshot,
//! rebased on the persisted state just observed, is scheduled through
//! the debounced writer, which keeps the single-writer discipline
//! intact.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::domain::{Collection, Entity};
use crate::repository::PersistentStore;

use super::events::{EventBus, PersistenceEvent};
use super::writer::FlushRequest;

/// Drift found by one check pass
#[derive(Debug, Clone, Default)]
pub struct DriftReport {
    pub missing_in_store: Vec<String>,
    pub extra_in_store: Vec<String>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.missing_in_store.is_empty() && self.extra_in_store.is_empty()
    }
}

/// Compare in-memory ids against persisted ids
pub fn check_drift<T: Entity>(in_memory: &HashSet<T::Id>, persisted: &HashSet<T::Id>) -> DriftReport {
    let mut missing_in_store: Vec<String> = in_memory
        .iter()
        .filter(|id| !persisted.contains(id))
        .map(|id| id.to_string())
        .collect();
    let mut extra_in_store: Vec<String> = persisted
        .iter()
        .filter(|id| !in_memory.contains(id))
        .map(|id| id.to_string())
        .collect();
    missing_in_store.sort();
    extra_in_store.sort();
    DriftReport {
        missing_in_store,
        extra_in_store,
    }
}

pub struct ConsistencyChecker {
    task: JoinHandle<()>,
}

impl ConsistencyChecker {
    /// Spawn the recurring check tied to the engine's lifetime
    ///
    /// `heal` is the writer's sender; when present, drift schedules a
    /// forced flush of the current snapshot.
    pub fn spawn<T: Entity>(
        name: &str,
        interval: Duration,
        store: Arc<dyn PersistentStore<T>>,
        collection: Arc<RwLock<Collection<T>>>,
        bus: EventBus,
        heal: Option<mpsc::UnboundedSender<FlushRequest<T>>>,
    ) -> Self {
        let name = name.to_string();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; skip the startup tick
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let persisted = match store.read_all().await {
                    Ok(entities) => entities,
                    Err(e) => {
                        warn!("[{}] consistency check read failed: {}", name, e);
                        continue;
                    }
                };
                let persisted_ids: HashSet<T::Id> = persisted.iter().map(|e| e.id()).collect();

                let (in_memory_ids, snapshot) = {
                    let guard = collection.read().await;
                    (guard.ids(), guard.snapshot())
                };

                let report = check_drift::<T>(&in_memory_ids, &persisted_ids);
                if report.is_clean() {
                    debug!("[{}] consistency check: clean ({} ids)", name, in_memory_ids.len());
                    continue;
                }

                warn!(
                    "[{}] consistency drift: missing_in_store={:?} extra_in_store={:?}",
                    name, report.missing_in_store, report.extra_in_store
                );
                bus.publish(PersistenceEvent::DriftDetected {
                    collection: name.clone(),
                    missing_in_store: report.missing_in_store.clone(),
                    extra_in_store: report.extra_in_store.clone(),
                });

                // Hand the writer the persisted state we just read, so
                // the reconciler diffs against what is actually in the
                // store and deletes the extra rows too.
                if let Some(tx) = &heal {
                    let req = FlushRequest {
                        snapshot,
                        resync: Some(persisted),
                    };
                    if tx.send(req).is_ok() {
                        debug!("[{}] scheduled self-healing flush", name);
                    }
                }
            }
        });

        Self { task }
    }

    /// Stop the recurring check
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}
