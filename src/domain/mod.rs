//! Domain Layer
//!
//! Contains all domain entities and core abstractions.
//! This layer has NO external dependencies (except serde/chrono for
//! serialization and timestamps).

mod card;
mod collection;
mod entity;
mod folder;

pub use card::Card;
pub use collection::Collection;
pub use entity::{Entity, PersistenceError, PersistenceResult};
pub use folder::Folder;
