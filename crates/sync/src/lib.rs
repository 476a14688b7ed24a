//! Cloud sync for annotated documents
//!
//! Keeps local PDF files and their copies on a cloud drive in step. The
//! drive itself is behind the [`CloudDrive`] trait; this crate only decides
//! which way a file has to move, performs the transfer and records the
//! outcome in the local sync mirror.

mod classify;
mod service;

pub use classify::classify;
pub use pdf_annotator_storage::{SyncRecord, SyncStatus};
pub use service::{Resolution, SyncService};

use pdf_annotator_storage::StorageError;

/// Credential returned by a successful sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountToken(String);

impl AccountToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A file as the drive reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub remote_id: String,
    pub name: String,
    /// Epoch milliseconds
    pub modified_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("sign-in was cancelled")]
    SignInCancelled,
    #[error("cloud drive is not configured: {0}")]
    NotConfigured(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("remote file not found: {0}")]
    NotFound(String),
    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sync state error: {0}")]
    Storage(#[from] StorageError),
}

impl SyncError {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            SyncError::SignInCancelled => "Sign-in was cancelled.".to_owned(),
            SyncError::NotConfigured(_) => {
                "Cloud sync is not set up. Configure an account to sync documents.".to_owned()
            }
            SyncError::Network(_) => {
                "Could not reach the cloud drive. Check your connection and try again.".to_owned()
            }
            SyncError::NotFound(_) => "The file no longer exists on the cloud drive.".to_owned(),
            SyncError::Io(err) => format!("The local file could not be accessed: {err}"),
            SyncError::Storage(_) => "Sync state could not be saved.".to_owned(),
        }
    }
}

pub trait CloudDrive {
    fn sign_in(&mut self) -> Result<AccountToken, SyncError>;

    /// Create (`remote_id == None`) or replace a remote file
    fn upload(
        &mut self,
        token: &AccountToken,
        name: &str,
        bytes: &[u8],
        remote_id: Option<&str>,
    ) -> Result<RemoteFile, SyncError>;

    fn download(&mut self, token: &AccountToken, remote_id: &str) -> Result<Vec<u8>, SyncError>;

    /// Files modified after `since` (epoch milliseconds)
    fn list_changes(&mut self, token: &AccountToken, since: i64)
        -> Result<Vec<RemoteFile>, SyncError>;
}
