//! Domain Layer - Core Entity Trait
//!
//! This trait defines the basic contract for all persisted entities.
//! All entities must have a unique, stable ID and be thread-safe.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Core trait for all persisted domain entities
///
/// Identity is the `id`; all other fields are mutable. The reconciler
/// relies on `PartialEq` to tell whether an update actually changed
/// anything, and on serde for legacy-store payloads and backups.
pub trait Entity:
    Sized + Send + Sync + Clone + PartialEq + Serialize + DeserializeOwned + 'static
{
    /// The type of the entity's unique identifier
    type Id: Clone + Eq + Ord + std::hash::Hash + std::fmt::Display + Send + Sync + 'static;

    /// Returns the entity's unique identifier
    fn id(&self) -> Self::Id;
}

/// Common result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Persistence-level errors
///
/// Low-level store errors are normalized into one of these at the
/// adapter boundary before they reach the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PersistenceError {
    /// Legacy read or persistent bulk-write error during one-time migration
    MigrationFailed(String),
    /// A store operation failed while applying a diff (after the retry)
    ReconciliationFailed(String),
    /// The underlying storage backend is absent or cannot be opened
    StoreUnavailable(String),
    InvalidInput(String),
    Internal(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::MigrationFailed(msg) => write!(f, "Migration failed: {}", msg),
            PersistenceError::ReconciliationFailed(msg) => {
                write!(f, "Reconciliation failed: {}", msg)
            }
            PersistenceError::StoreUnavailable(msg) => write!(f, "Store unavailable: {}", msg),
            PersistenceError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            PersistenceError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for PersistenceError {}
