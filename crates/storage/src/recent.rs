//! Recently opened documents

use crate::{now_millis, StorageError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentDocument {
    /// Local path of the document, primary key
    pub path: String,
    /// Where the document originally came from, if not a local file
    pub original_uri: Option<String>,
    pub name: String,
    pub last_page: u32,
    pub total_pages: u32,
    /// Milliseconds since the Unix epoch
    pub last_opened: i64,
    pub thumbnail_path: Option<String>,
}

impl RecentDocument {
    /// Entry for a document opened right now
    pub fn opened_now(path: impl Into<String>, name: impl Into<String>, total_pages: u32) -> Self {
        Self {
            path: path.into(),
            original_uri: None,
            name: name.into(),
            last_page: 0,
            total_pages,
            last_opened: now_millis(),
            thumbnail_path: None,
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            path: row.get(0)?,
            original_uri: row.get(1)?,
            name: row.get(2)?,
            last_page: row.get(3)?,
            total_pages: row.get(4)?,
            last_opened: row.get(5)?,
            thumbnail_path: row.get(6)?,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT path, original_uri, name, last_page, total_pages, last_opened, thumbnail_path
     FROM recent_documents";

pub struct RecentDocumentsRepository<'c> {
    conn: &'c Connection,
}

impl<'c> RecentDocumentsRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert or refresh an entry
    pub fn upsert(&self, document: &RecentDocument) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO recent_documents
             (path, original_uri, name, last_page, total_pages, last_opened, thumbnail_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(path) DO UPDATE SET
                original_uri = excluded.original_uri,
                name = excluded.name,
                last_page = excluded.last_page,
                total_pages = excluded.total_pages,
                last_opened = excluded.last_opened,
                thumbnail_path = excluded.thumbnail_path",
            params![
                document.path,
                document.original_uri,
                document.name,
                document.last_page,
                document.total_pages,
                document.last_opened,
                document.thumbnail_path,
            ],
        )?;
        debug!(path = %document.path, "recorded recent document");
        Ok(())
    }

    pub fn get(&self, path: &str) -> Result<Option<RecentDocument>, StorageError> {
        let sql = format!("{SELECT_COLUMNS} WHERE path = ?1");
        Ok(self.conn.query_row(&sql, [path], RecentDocument::from_row).optional()?)
    }

    /// Most recently opened first
    pub fn list(&self, limit: usize) -> Result<Vec<RecentDocument>, StorageError> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY last_opened DESC, path LIMIT ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        let documents = stmt
            .query_map([limit as i64], RecentDocument::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(documents)
    }

    pub fn update_last_page(&self, path: &str, page: u32) -> Result<bool, StorageError> {
        let updated = self.conn.execute(
            "UPDATE recent_documents SET last_page = ?1 WHERE path = ?2",
            params![page, path],
        )?;
        Ok(updated > 0)
    }

    pub fn remove(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.conn.execute("DELETE FROM recent_documents WHERE path = ?1", [path])? > 0)
    }

    /// Keep only the `keep` most recent entries, returning how many were dropped
    pub fn prune(&self, keep: usize) -> Result<usize, StorageError> {
        let removed = self.conn.execute(
            "DELETE FROM recent_documents WHERE path NOT IN (
                SELECT path FROM recent_documents ORDER BY last_opened DESC, path LIMIT ?1
             )",
            [keep as i64],
        )?;
        if removed > 0 {
            debug!(removed, keep, "pruned recent documents");
        }
        Ok(removed)
    }
}
