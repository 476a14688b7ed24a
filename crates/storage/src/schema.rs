//! Database schema and migrations
//!
//! The version is tracked in SQLite's `user_version` pragma. Databases
//! newer than this build are refused rather than modified.

use crate::StorageError;
use rusqlite::Connection;
use tracing::debug;

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS strokes (
    id TEXT PRIMARY KEY NOT NULL,
    document_path TEXT NOT NULL,
    page_number INTEGER NOT NULL,
    points TEXT NOT NULL,
    color INTEGER NOT NULL,
    width REAL NOT NULL,
    is_highlighter INTEGER NOT NULL DEFAULT 0,
    seq INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_strokes_document ON strokes(document_path, page_number);

CREATE TABLE IF NOT EXISTS shapes (
    id TEXT PRIMARY KEY NOT NULL,
    document_path TEXT NOT NULL,
    page_number INTEGER NOT NULL,
    type TEXT NOT NULL,
    start_x REAL NOT NULL,
    start_y REAL NOT NULL,
    end_x REAL NOT NULL,
    end_y REAL NOT NULL,
    color INTEGER NOT NULL,
    width REAL NOT NULL,
    is_filled INTEGER NOT NULL DEFAULT 0,
    seq INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_shapes_document ON shapes(document_path, page_number);

CREATE TABLE IF NOT EXISTS recent_documents (
    path TEXT PRIMARY KEY NOT NULL,
    original_uri TEXT,
    name TEXT NOT NULL,
    last_page INTEGER NOT NULL DEFAULT 0,
    total_pages INTEGER NOT NULL DEFAULT 0,
    last_opened INTEGER NOT NULL,
    thumbnail_path TEXT
);
CREATE INDEX IF NOT EXISTS idx_recent_opened ON recent_documents(last_opened DESC);

CREATE TABLE IF NOT EXISTS sync_mirror (
    local_path TEXT PRIMARY KEY NOT NULL,
    remote_id TEXT,
    local_modified_at INTEGER NOT NULL,
    remote_modified_at INTEGER,
    status TEXT NOT NULL,
    last_error TEXT
);
";

/// Current schema version of an open database
pub fn version(conn: &Connection) -> Result<i64, StorageError> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Bring the database up to [`SCHEMA_VERSION`]
pub fn migrate(conn: &Connection) -> Result<(), StorageError> {
    let current = version(conn)?;
    if current > SCHEMA_VERSION {
        return Err(StorageError::UnsupportedSchema(current));
    }
    if current == SCHEMA_VERSION {
        return Ok(());
    }

    debug!(from = current, to = SCHEMA_VERSION, "migrating annotation database");
    conn.execute_batch(SCHEMA_V1)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// In-memory database with the current schema, for tests and tools
pub fn open_in_memory() -> Result<Connection, StorageError> {
    let conn = Connection::open_in_memory()?;
    migrate(&conn)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(version(&conn).unwrap(), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('strokes', 'shapes', 'recent_documents', 'sync_mirror')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 4);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
        assert!(matches!(migrate(&conn), Err(StorageError::UnsupportedSchema(_))));
    }
}
