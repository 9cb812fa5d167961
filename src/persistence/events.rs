//! Persistence Events
//!
//! Typed event bus owned by the composition root and passed by
//! reference to the engines. Subscribers are optional; publishing to
//! nobody is not an error.

use tokio::sync::broadcast;

/// Events emitted by the persistence engine
#[derive(Debug, Clone)]
pub enum PersistenceEvent {
    /// One-time legacy migration finished for a collection
    MigrationCompleted { collection: String, migrated: usize },
    /// A reconciler pass landed
    FlushCompleted {
        collection: String,
        added: usize,
        updated: usize,
        deleted: usize,
    },
    /// A reconciler pass failed twice; a backup snapshot was written
    PersistenceDegraded {
        collection: String,
        backup_id: String,
        reason: String,
    },
    /// The consistency checker found an id-set mismatch
    DriftDetected {
        collection: String,
        missing_in_store: Vec<String>,
        extra_in_store: Vec<String>,
    },
}

/// Broadcast bus for persistence events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PersistenceEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PersistenceEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: PersistenceEvent) {
        // send only fails when there are no subscribers
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
