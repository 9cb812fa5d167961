//! Card Entity
//!
//! A note card. Cards live inside folders (or at the root) and go
//! through the same persistence engine as folders.

use serde::{Deserialize, Serialize};

use super::entity::Entity;

/// A note card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Unique, stable identifier
    pub id: String,
    /// Card title
    pub title: String,
    /// Card body (Markdown content)
    pub content: String,
    /// Owning folder ID (None = unfiled)
    pub folder_id: Option<String>,
    /// Position within the folder (for ordering)
    pub order: i64,
    /// Last modification time, milliseconds since epoch
    pub updated_at: i64,
}

impl Card {
    /// Create a new unfiled card with default values
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: String::new(),
            folder_id: None,
            order: 0,
            updated_at: chrono::Local::now().timestamp_millis(),
        }
    }

    /// Create a new card inside a folder
    pub fn new_in_folder(
        id: impl Into<String>,
        title: impl Into<String>,
        folder_id: impl Into<String>,
        order: i64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: String::new(),
            folder_id: Some(folder_id.into()),
            order,
            updated_at: chrono::Local::now().timestamp_millis(),
        }
    }

    /// Stamp the entity as modified now
    pub fn touch(&mut self) {
        self.updated_at = chrono::Local::now().timestamp_millis();
    }
}

impl Entity for Card {
    type Id = String;

    fn id(&self) -> Self::Id {
        self.id.clone()
    }
}
