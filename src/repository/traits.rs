//! Repository Layer - Core Traits
//!
//! Defines the abstract interfaces for data access.
//! Implementations can use SQLite, in-memory, etc.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::domain::{Entity, PersistenceError, PersistenceResult};

/// Durable key-indexed store for one entity kind
///
/// Generic over any Entity type. All operations are async to support
/// various backends. `bulk_write` is the reconciler's single entry
/// point: implementations apply deletes, then updates, then adds, and
/// fail the whole call if any part fails.
#[async_trait]
pub trait PersistentStore<T: Entity>: Send + Sync {
    /// Read every entity in the store
    async fn read_all(&self) -> PersistenceResult<Vec<T>>;

    /// Apply a batch of deletes, updates and adds, in that order
    async fn bulk_write(
        &self,
        add: &[T],
        update: &[T],
        delete: &[T::Id],
    ) -> PersistenceResult<()>;

    /// Remove every entity (manual recovery only)
    async fn clear(&self) -> PersistenceResult<()>;
}

/// Simple key-value fallback store
///
/// Used for the migration flag, pre-migration reads and emergency
/// backup snapshots. Values are raw JSON strings; use [`get_json`] /
/// [`set_json`] for typed access.
#[async_trait]
pub trait LegacyStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> PersistenceResult<Option<String>>;

    async fn set_raw(&self, key: &str, value: &str) -> PersistenceResult<()>;

    async fn remove(&self, key: &str) -> PersistenceResult<()>;

    /// All keys currently present (used to list backup snapshots)
    async fn keys(&self) -> PersistenceResult<Vec<String>>;
}

/// Typed read from a legacy store
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn LegacyStore,
    key: &str,
) -> PersistenceResult<Option<T>> {
    match store.get_raw(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| PersistenceError::Internal(format!("bad payload at {}: {}", key, e))),
        None => Ok(None),
    }
}

/// Typed write to a legacy store
pub async fn set_json<T: Serialize>(
    store: &dyn LegacyStore,
    key: &str,
    value: &T,
) -> PersistenceResult<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| PersistenceError::Internal(format!("serialize {}: {}", key, e)))?;
    store.set_raw(key, &raw).await
}
