//! Debounced Writer
//!
//! Coalesces rapid mutation bursts into a single reconciler pass after
//! a quiet period. One spawned task per collection owns the flush loop,
//! which serializes passes: there is never more than one in-flight
//! reconciliation, and a schedule call arriving mid-flight queues in
//! the channel and leads to exactly one follow-up flush with the
//! newest snapshot.

use std::time::Duration;

use log::{debug, error};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use crate::domain::Entity;

use super::reconcile::Reconciler;

/// One unit of work for the flush loop
pub struct FlushRequest<T: Entity> {
    pub snapshot: Vec<T>,
    /// Persisted state observed by the sender. When set, it replaces
    /// the reconciler's diff baseline before the pass runs, so rows
    /// that appeared in the store behind the engine's back get deleted
    /// instead of surviving every pass (consistency-check self-healing).
    pub resync: Option<Vec<T>>,
}

impl<T: Entity> FlushRequest<T> {
    pub fn flush(snapshot: Vec<T>) -> Self {
        Self {
            snapshot,
            resync: None,
        }
    }
}

pub struct DebouncedWriter<T: Entity> {
    tx: mpsc::UnboundedSender<FlushRequest<T>>,
    task: JoinHandle<()>,
}

impl<T: Entity> DebouncedWriter<T> {
    /// Spawn the flush loop, taking ownership of the reconciler
    pub fn spawn(name: &str, quiet_period: Duration, mut reconciler: Reconciler<T>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<FlushRequest<T>>();
        let name = name.to_string();

        let task = tokio::spawn(async move {
            while let Some(mut req) = rx.recv().await {
                // Quiet period restarts on every schedule call; only the
                // newest snapshot survives the window.
                loop {
                    match time::timeout(quiet_period, rx.recv()).await {
                        Ok(Some(newer)) => {
                            req.snapshot = newer.snapshot;
                            // A pending resync survives coalescing
                            if newer.resync.is_some() {
                                req.resync = newer.resync;
                            }
                        }
                        Ok(None) => {
                            // Teardown with a pending snapshot: final flush
                            debug!("[{}] writer closing, flushing pending snapshot", name);
                            if let Some(persisted) = req.resync.take() {
                                reconciler.seed(&persisted);
                            }
                            if let Err(e) = reconciler.apply(&req.snapshot).await {
                                error!("[{}] final flush failed: {}", name, e);
                            }
                            return;
                        }
                        Err(_) => break,
                    }
                }
                if let Some(persisted) = req.resync.take() {
                    reconciler.seed(&persisted);
                }
                if let Err(e) = reconciler.apply(&req.snapshot).await {
                    error!("[{}] flush failed: {}", name, e);
                }
            }
        });

        Self { tx, task }
    }

    /// Schedule a write of the latest collection snapshot
    pub fn schedule(&self, snapshot: Vec<T>) {
        // Fails only after shutdown; nothing left to do then
        let _ = self.tx.send(FlushRequest::flush(snapshot));
    }

    /// A sender handle for other tasks (consistency-check self-healing)
    pub fn sender(&self) -> mpsc::UnboundedSender<FlushRequest<T>> {
        self.tx.clone()
    }

    /// Close the channel and wait for the final flush
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.task.await;
    }
}
