//! Persistence Engine Layer
//!
//! Migration, reconciliation, debounced writing, consistency checking
//! and the diagnostic surface, composed per collection by
//! [`engine::PersistenceEngine`].

mod checker;
mod diagnostics;
mod engine;
mod events;
mod migration;
mod reconcile;
mod writer;

#[cfg(test)]
mod tests;

pub use checker::{check_drift, ConsistencyChecker, DriftReport};
pub use diagnostics::EngineStatus;
pub use engine::{EngineConfig, PersistenceEngine, StoreMode};
pub use events::{EventBus, PersistenceEvent};
pub use migration::{MigrationController, MigrationOutcome};
pub use reconcile::{diff, Diff, FlushStats, Reconciler};
pub use writer::{DebouncedWriter, FlushRequest};
