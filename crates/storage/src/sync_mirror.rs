//! Local mirror of cloud sync state
//!
//! One row per synced document records the remote id, the modification
//! times seen at the last successful sync and the current status.

use crate::StorageError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Synced,
    PendingUpload,
    PendingDownload,
    Conflict,
    Uploading,
    Downloading,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "SYNCED",
            SyncStatus::PendingUpload => "PENDING_UPLOAD",
            SyncStatus::PendingDownload => "PENDING_DOWNLOAD",
            SyncStatus::Conflict => "CONFLICT",
            SyncStatus::Uploading => "UPLOADING",
            SyncStatus::Downloading => "DOWNLOADING",
            SyncStatus::Error => "ERROR",
        }
    }

    /// A transfer for this document is running
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SyncStatus::Uploading | SyncStatus::Downloading)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "SYNCED" => SyncStatus::Synced,
            "PENDING_UPLOAD" => SyncStatus::PendingUpload,
            "PENDING_DOWNLOAD" => SyncStatus::PendingDownload,
            "CONFLICT" => SyncStatus::Conflict,
            "UPLOADING" => SyncStatus::Uploading,
            "DOWNLOADING" => SyncStatus::Downloading,
            "ERROR" => SyncStatus::Error,
            other => return Err(StorageError::InvalidValue(format!("sync status {other:?}"))),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub local_path: String,
    /// Remote file id; `None` until the first upload
    pub remote_id: Option<String>,
    /// Local modification time at the last sync, epoch milliseconds
    pub local_modified_at: i64,
    /// Remote modification time at the last sync, epoch milliseconds
    pub remote_modified_at: Option<i64>,
    pub status: SyncStatus,
    pub last_error: Option<String>,
}

impl SyncRecord {
    /// A local document that has never been uploaded
    pub fn new_local(local_path: impl Into<String>, local_modified_at: i64) -> Self {
        Self {
            local_path: local_path.into(),
            remote_id: None,
            local_modified_at,
            remote_modified_at: None,
            status: SyncStatus::PendingUpload,
            last_error: None,
        }
    }
}

const SELECT_COLUMNS: &str =
    "SELECT local_path, remote_id, local_modified_at, remote_modified_at, status, last_error
     FROM sync_mirror";

struct RawRecord {
    record: SyncRecord,
    status: String,
}

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        record: SyncRecord {
            local_path: row.get(0)?,
            remote_id: row.get(1)?,
            local_modified_at: row.get(2)?,
            remote_modified_at: row.get(3)?,
            status: SyncStatus::Error,
            last_error: row.get(5)?,
        },
        status: row.get(4)?,
    })
}

impl RawRecord {
    fn into_record(self) -> Result<SyncRecord, StorageError> {
        Ok(SyncRecord { status: self.status.parse()?, ..self.record })
    }
}

pub struct SyncMirrorRepository<'c> {
    conn: &'c Connection,
}

impl<'c> SyncMirrorRepository<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, local_path: &str) -> Result<Option<SyncRecord>, StorageError> {
        let sql = format!("{SELECT_COLUMNS} WHERE local_path = ?1");
        self.conn
            .query_row(&sql, [local_path], raw_from_row)
            .optional()?
            .map(RawRecord::into_record)
            .transpose()
    }

    pub fn upsert(&self, record: &SyncRecord) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO sync_mirror
             (local_path, remote_id, local_modified_at, remote_modified_at, status, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(local_path) DO UPDATE SET
                remote_id = excluded.remote_id,
                local_modified_at = excluded.local_modified_at,
                remote_modified_at = excluded.remote_modified_at,
                status = excluded.status,
                last_error = excluded.last_error",
            params![
                record.local_path,
                record.remote_id,
                record.local_modified_at,
                record.remote_modified_at,
                record.status.as_str(),
                record.last_error,
            ],
        )?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<SyncRecord>, StorageError> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY local_path");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], raw_from_row)?.collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRecord::into_record).collect()
    }

    pub fn list_by_status(&self, status: SyncStatus) -> Result<Vec<SyncRecord>, StorageError> {
        let sql = format!("{SELECT_COLUMNS} WHERE status = ?1 ORDER BY local_path");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows =
            stmt.query_map([status.as_str()], raw_from_row)?.collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawRecord::into_record).collect()
    }

    /// Change the status of an existing record; `error` replaces `last_error`
    pub fn set_status(
        &self,
        local_path: &str,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<bool, StorageError> {
        let updated = self.conn.execute(
            "UPDATE sync_mirror SET status = ?1, last_error = ?2 WHERE local_path = ?3",
            params![status.as_str(), error, local_path],
        )?;
        Ok(updated > 0)
    }

    pub fn remove(&self, local_path: &str) -> Result<bool, StorageError> {
        Ok(self.conn.execute("DELETE FROM sync_mirror WHERE local_path = ?1", [local_path])? > 0)
    }
}
