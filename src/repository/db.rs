//! Database Connection and Setup
//!
//! Manages the SQLite connection and schema migrations for the
//! persistent store.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::domain::{PersistenceError, PersistenceResult};

/// Open (or create) the database and bring the schema up to date
pub async fn init_db(db_path: &Path) -> PersistenceResult<Arc<Mutex<Connection>>> {
    let conn = Connection::open(db_path)
        .map_err(|e| PersistenceError::StoreUnavailable(format!("Failed to open db: {}", e)))?;

    run_migrations(&conn)?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// Check if a column exists in a table
fn column_exists(conn: &Connection, table: &str, column: &str) -> bool {
    let query = format!("PRAGMA table_info({})", table);
    let mut stmt = match conn.prepare(&query) {
        Ok(stmt) => stmt,
        Err(_) => return false,
    };
    let mut rows = match stmt.query([]) {
        Ok(rows) => rows,
        Err(_) => return false,
    };
    while let Ok(Some(row)) = rows.next() {
        if let Ok(name) = row.get::<_, String>(1) {
            if name == column {
                return true;
            }
        }
    }
    false
}

/// Run schema migrations
fn run_migrations(conn: &Connection) -> PersistenceResult<()> {
    // Folders table - create if not exists
    conn.execute(
        "CREATE TABLE IF NOT EXISTS folders (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            parent_id TEXT,
            expanded INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )
    .map_err(|e| PersistenceError::Internal(e.to_string()))?;

    // Cards table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cards (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '',
            folder_id TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )
    .map_err(|e| PersistenceError::Internal(e.to_string()))?;

    // updated_at was added after the first release
    for table in ["folders", "cards"] {
        if !column_exists(conn, table, "updated_at") {
            conn.execute(
                &format!(
                    "ALTER TABLE {} ADD COLUMN updated_at INTEGER NOT NULL DEFAULT 0",
                    table
                ),
                [],
            )
            .map_err(|e| {
                PersistenceError::Internal(format!("Failed to add updated_at: {}", e))
            })?;
        }
    }

    // Indexes for parent/folder lookups
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id)",
        [],
    )
    .map_err(|e| PersistenceError::Internal(e.to_string()))?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cards_folder ON cards(folder_id)",
        [],
    )
    .map_err(|e| PersistenceError::Internal(e.to_string()))?;

    Ok(())
}
