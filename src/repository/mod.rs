//! Repository Layer
//!
//! Data access abstractions and implementations.

pub mod db;
mod legacy_store;
mod sqlite_store;
mod traits;


pub use db::init_db;
pub use legacy_store::JsonFileStore;
pub use sqlite_store::{SqliteCardStore, SqliteFolderStore};
pub use traits::{get_json, set_json, LegacyStore, PersistentStore};
