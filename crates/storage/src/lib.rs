//! Local persistence for the PDF annotator
//!
//! Annotations, recent documents and the cloud sync mirror live in one
//! SQLite database under the data directory; user preferences sit next to
//! it as a versioned JSON file.

pub mod annotations;
pub mod recent;
pub mod schema;
pub mod sync_mirror;
pub mod worker;

pub use annotations::AnnotationRepository;
pub use recent::{RecentDocument, RecentDocumentsRepository};
pub use sync_mirror::{SyncMirrorRepository, SyncRecord, SyncStatus};
pub use worker::{PersistenceWorker, ReplyHandle};

use directories::ProjectDirs;
use pdf_annotator_core::AnnotatorConfig;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const PREFS_SCHEMA_VERSION: u32 = 1;
const DATABASE_FILE: &str = "annotations.db";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("unsupported database schema version {0}")]
    UnsupportedSchema(i64),
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
    #[error("persistence worker has stopped")]
    WorkerStopped,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// User preferences persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Annotation engine tunables
    pub annotator: AnnotatorConfig,

    /// Reopen documents on the page they were last viewed at
    pub restore_last_page: bool,

    /// Entries kept in the recent documents list
    pub recent_limit: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self { annotator: AnnotatorConfig::default(), restore_last_page: true, recent_limit: 20 }
    }
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PreferencesEnvelope {
    version: u32,
    preferences: Preferences,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "PdfAnnotator", "PdfAnnotator")
            .ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    /// Open the annotation database, creating and migrating it as needed
    pub fn open_database(&self) -> Result<Connection, StorageError> {
        fs::create_dir_all(&self.root)?;
        let conn = Connection::open(self.database_path())?;
        schema::migrate(&conn)?;
        Ok(conn)
    }

    pub fn load_preferences(&self) -> Result<Preferences, StorageError> {
        let path = self.preferences_path();
        if !path.exists() {
            return Ok(Preferences::default());
        }

        let bytes = fs::read(path)?;
        let envelope: PreferencesEnvelope = serde_json::from_slice(&bytes)?;

        Ok(envelope.preferences)
    }

    pub fn save_preferences(&self, preferences: &Preferences) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let envelope =
            PreferencesEnvelope { version: PREFS_SCHEMA_VERSION, preferences: preferences.clone() };

        let bytes = serde_json::to_vec_pretty(&envelope)?;
        fs::write(self.preferences_path(), bytes)?;
        Ok(())
    }

    fn preferences_path(&self) -> PathBuf {
        self.root.join("preferences.json")
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
