//! Folder Entity
//!
//! A folder organizes cards into a tree (single parent). Display order
//! within siblings is carried by `order`.

use serde::{Deserialize, Serialize};

use super::entity::Entity;

/// A folder with hierarchical structure
///
/// Field names serialize as camelCase because legacy-store payloads and
/// backups share the wire shape of the original browser storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    /// Unique, stable identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Parent folder ID (None = root level)
    pub parent_id: Option<String>,
    /// Whether children are shown expanded in the UI
    pub expanded: bool,
    /// Position within siblings (for ordering)
    pub order: i64,
    /// Last modification time, milliseconds since epoch
    pub updated_at: i64,
}

impl Folder {
    /// Create a new root folder with default values
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
            expanded: true,
            order: 0,
            updated_at: chrono::Local::now().timestamp_millis(),
        }
    }

    /// Create a new child folder under a parent
    pub fn new_child(
        id: impl Into<String>,
        name: impl Into<String>,
        parent_id: impl Into<String>,
        order: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: Some(parent_id.into()),
            expanded: true,
            order,
            updated_at: chrono::Local::now().timestamp_millis(),
        }
    }

    /// Check if this is a root folder (no parent)
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Stamp the entity as modified now
    pub fn touch(&mut self) {
        self.updated_at = chrono::Local::now().timestamp_millis();
    }
}

impl Entity for Folder {
    type Id = String;

    fn id(&self) -> Self::Id {
        self.id.clone()
    }
}
