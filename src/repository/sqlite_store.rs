//! SQLite Store Implementation
//!
//! SQLite-backed implementations of PersistentStore<Folder> and
//! PersistentStore<Card>. Both stores share one connection; each
//! bulk write runs inside a transaction so a pass either fully lands
//! or fully fails.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use tokio::sync::Mutex;

use crate::domain::{Card, Folder, PersistenceError, PersistenceResult};

use super::traits::PersistentStore;

fn internal(e: rusqlite::Error) -> PersistenceError {
    PersistenceError::Internal(e.to_string())
}

// ============================================================================
// Folders
// ============================================================================

/// SQLite implementation of the folder store
pub struct SqliteFolderStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteFolderStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl PersistentStore<Folder> for SqliteFolderStore {
    async fn read_all(&self) -> PersistenceResult<Vec<Folder>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn
            .prepare(
                "SELECT id, name, parent_id, expanded, sort_order, updated_at \
                 FROM folders ORDER BY sort_order ASC, id ASC",
            )
            .map_err(internal)?;
        let mut rows = stmt.query([]).map_err(internal)?;

        let mut folders = Vec::new();
        while let Ok(Some(row)) = rows.next() {
            folders.push(row_to_folder(row)?);
        }
        Ok(folders)
    }

    async fn bulk_write(
        &self,
        add: &[Folder],
        update: &[Folder],
        delete: &[String],
    ) -> PersistenceResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(internal)?;

        // Deletes first, then updates, then adds
        for id in delete {
            tx.execute("DELETE FROM folders WHERE id = ?1", params![id])
                .map_err(internal)?;
        }
        // Adds and updates both upsert: retried migrations stay
        // overwrite-idempotent, and a self-healing pass can recreate
        // rows that drifted out of the store.
        for folder in update.iter().chain(add) {
            tx.execute(
                "INSERT OR REPLACE INTO folders \
                 (id, name, parent_id, expanded, sort_order, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    folder.id,
                    folder.name,
                    folder.parent_id,
                    folder.expanded as i64,
                    folder.order,
                    folder.updated_at
                ],
            )
            .map_err(internal)?;
        }

        tx.commit().map_err(internal)
    }

    async fn clear(&self) -> PersistenceResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM folders", []).map_err(internal)?;
        Ok(())
    }
}

/// Convert a database row to Folder
fn row_to_folder(row: &Row) -> PersistenceResult<Folder> {
    Ok(Folder {
        id: row.get(0).map_err(internal)?,
        name: row.get(1).map_err(internal)?,
        parent_id: row.get::<_, Option<String>>(2).ok().flatten(),
        expanded: row.get::<_, i64>(3).unwrap_or(1) != 0,
        order: row.get(4).unwrap_or(0),
        updated_at: row.get(5).unwrap_or(0),
    })
}

// ============================================================================
// Cards
// ============================================================================

/// SQLite implementation of the card store
pub struct SqliteCardStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCardStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl PersistentStore<Card> for SqliteCardStore {
    async fn read_all(&self) -> PersistenceResult<Vec<Card>> {
        let conn = self.conn.lock().await;

        let mut stmt = conn
            .prepare(
                "SELECT id, title, content, folder_id, sort_order, updated_at \
                 FROM cards ORDER BY sort_order ASC, id ASC",
            )
            .map_err(internal)?;
        let mut rows = stmt.query([]).map_err(internal)?;

        let mut cards = Vec::new();
        while let Ok(Some(row)) = rows.next() {
            cards.push(row_to_card(row)?);
        }
        Ok(cards)
    }

    async fn bulk_write(
        &self,
        add: &[Card],
        update: &[Card],
        delete: &[String],
    ) -> PersistenceResult<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(internal)?;

        for id in delete {
            tx.execute("DELETE FROM cards WHERE id = ?1", params![id])
                .map_err(internal)?;
        }
        for card in update.iter().chain(add) {
            tx.execute(
                "INSERT OR REPLACE INTO cards \
                 (id, title, content, folder_id, sort_order, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    card.id,
                    card.title,
                    card.content,
                    card.folder_id,
                    card.order,
                    card.updated_at
                ],
            )
            .map_err(internal)?;
        }

        tx.commit().map_err(internal)
    }

    async fn clear(&self) -> PersistenceResult<()> {
        let conn = self.conn.lock().await;
        conn.execute("DELETE FROM cards", []).map_err(internal)?;
        Ok(())
    }
}

/// Convert a database row to Card
fn row_to_card(row: &Row) -> PersistenceResult<Card> {
    Ok(Card {
        id: row.get(0).map_err(internal)?,
        title: row.get(1).map_err(internal)?,
        content: row.get(2).unwrap_or_default(),
        folder_id: row.get::<_, Option<String>>(3).ok().flatten(),
        order: row.get(4).unwrap_or(0),
        updated_at: row.get(5).unwrap_or(0),
    })
}
