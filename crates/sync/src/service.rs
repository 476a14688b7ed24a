use crate::{classify, AccountToken, CloudDrive, SyncError};
use pdf_annotator_storage::{SyncMirrorRepository, SyncRecord, SyncStatus};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};

/// How to settle a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Overwrite the remote copy with the local file
    KeepLocal,
    /// Overwrite the local file with the remote copy
    KeepRemote,
}

/// Moves documents between the local disk and a [`CloudDrive`]
///
/// Failures never escape [`SyncService::sync_file`]: they are recorded on
/// the document's mirror row with a user-readable message and reported as
/// [`SyncStatus::Error`].
pub struct SyncService<'c, D> {
    drive: D,
    mirror: SyncMirrorRepository<'c>,
    token: Option<AccountToken>,
}

impl<'c, D: CloudDrive> SyncService<'c, D> {
    pub fn new(drive: D, conn: &'c Connection) -> Self {
        Self { drive, mirror: SyncMirrorRepository::new(conn), token: None }
    }

    pub fn drive(&self) -> &D {
        &self.drive
    }

    pub fn drive_mut(&mut self) -> &mut D {
        &mut self.drive
    }

    /// Bring one document in step and return its final status
    pub fn sync_file(&mut self, path: &Path) -> SyncStatus {
        self.run(path, |service, path| service.try_sync(path))
    }

    /// Settle a conflict in the given direction
    pub fn resolve_conflict(&mut self, path: &Path, resolution: Resolution) -> SyncStatus {
        self.run(path, |service, path| {
            let record = service.record_for(path)?;
            match resolution {
                Resolution::KeepLocal => service.upload(path, record),
                Resolution::KeepRemote => service.download(path, record),
            }
        })
    }

    /// Sync every document the mirror knows about
    pub fn sync_all(&mut self) -> Vec<(String, SyncStatus)> {
        let records = match self.mirror.list() {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "could not list sync records");
                return Vec::new();
            }
        };
        records
            .into_iter()
            .map(|record| {
                let status = self.sync_file(Path::new(&record.local_path));
                (record.local_path, status)
            })
            .collect()
    }

    fn run(
        &mut self,
        path: &Path,
        operation: impl FnOnce(&mut Self, &Path) -> Result<SyncStatus, SyncError>,
    ) -> SyncStatus {
        match operation(self, path) {
            Ok(status) => status,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "sync failed");
                self.record_failure(path, &err);
                SyncStatus::Error
            }
        }
    }

    fn try_sync(&mut self, path: &Path) -> Result<SyncStatus, SyncError> {
        let record = self.record_for(path)?;
        let local_modified_at = modified_millis(path)?;
        let remote_modified_at = self.remote_modified_at(&record)?;

        let status = classify(&record, local_modified_at, remote_modified_at);
        debug!(path = %path.display(), status = %status, "classified");

        match status {
            SyncStatus::PendingUpload => self.upload(path, record),
            SyncStatus::PendingDownload => self.download(path, record),
            SyncStatus::Conflict | SyncStatus::Synced => {
                self.mirror.upsert(&SyncRecord { status, last_error: None, ..record })?;
                Ok(status)
            }
            other => Ok(other),
        }
    }

    fn record_for(&self, path: &Path) -> Result<SyncRecord, SyncError> {
        let key = path.to_string_lossy();
        Ok(self.mirror.get(&key)?.unwrap_or_else(|| SyncRecord::new_local(key, 0)))
    }

    fn token(&mut self) -> Result<AccountToken, SyncError> {
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        let token = self.drive.sign_in()?;
        self.token = Some(token.clone());
        Ok(token)
    }

    /// Current remote modification time, `None` if the remote copy is gone
    fn remote_modified_at(&mut self, record: &SyncRecord) -> Result<Option<i64>, SyncError> {
        let Some(remote_id) = &record.remote_id else {
            return Ok(None);
        };
        let token = self.token()?;
        let since = record.remote_modified_at.unwrap_or(0);
        let changes = self.drive.list_changes(&token, since)?;

        Ok(match changes.iter().find(|file| &file.remote_id == remote_id) {
            Some(file) => Some(file.modified_at),
            // Unchanged since the last sync
            None => record.remote_modified_at,
        })
    }

    fn upload(&mut self, path: &Path, record: SyncRecord) -> Result<SyncStatus, SyncError> {
        let token = self.token()?;
        self.mark(&record, SyncStatus::Uploading)?;

        let bytes = fs::read(path)?;
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let remote = self.drive.upload(&token, &name, &bytes, record.remote_id.as_deref())?;

        let synced = SyncRecord {
            remote_id: Some(remote.remote_id),
            local_modified_at: modified_millis(path)?,
            remote_modified_at: Some(remote.modified_at),
            status: SyncStatus::Synced,
            last_error: None,
            ..record
        };
        self.mirror.upsert(&synced)?;
        info!(path = %path.display(), "uploaded");
        Ok(SyncStatus::Synced)
    }

    fn download(&mut self, path: &Path, record: SyncRecord) -> Result<SyncStatus, SyncError> {
        let Some(remote_id) = record.remote_id.clone() else {
            return Err(SyncError::NotFound(path.display().to_string()));
        };
        let token = self.token()?;
        self.mark(&record, SyncStatus::Downloading)?;

        let bytes = self.drive.download(&token, &remote_id)?;
        write_atomically(path, &bytes)?;

        let remote_modified_at = self
            .drive
            .list_changes(&token, 0)?
            .into_iter()
            .find(|file| file.remote_id == remote_id)
            .map(|file| file.modified_at)
            .or(record.remote_modified_at);

        let synced = SyncRecord {
            local_modified_at: modified_millis(path)?,
            remote_modified_at,
            status: SyncStatus::Synced,
            last_error: None,
            ..record
        };
        self.mirror.upsert(&synced)?;
        info!(path = %path.display(), "downloaded");
        Ok(SyncStatus::Synced)
    }

    fn mark(&self, record: &SyncRecord, status: SyncStatus) -> Result<(), SyncError> {
        self.mirror.upsert(&SyncRecord { status, ..record.clone() })?;
        Ok(())
    }

    fn record_failure(&self, path: &Path, err: &SyncError) {
        let message = err.user_message();
        let result = self.record_for(path).and_then(|record| {
            let failed = SyncRecord { status: SyncStatus::Error, last_error: Some(message), ..record };
            Ok(self.mirror.upsert(&failed)?)
        });
        if let Err(store_err) = result {
            warn!(path = %path.display(), error = %store_err, "could not record sync failure");
        }
    }
}

fn modified_millis(path: &Path) -> Result<i64, SyncError> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified.duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or_default())
}

/// Write through a temporary sibling and rename over the target
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".download");
    fs::write(&temp, bytes)?;
    fs::rename(&temp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RemoteFile;
    use pdf_annotator_storage::schema::open_in_memory;
    use std::collections::HashMap;
    use std::fs::File;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime};

    #[derive(Default)]
    struct FakeDrive {
        files: HashMap<String, (Vec<u8>, i64)>,
        clock: i64,
        sign_ins: usize,
        offline: bool,
        refuse_sign_in: bool,
    }

    impl FakeDrive {
        /// Simulate an edit made on another device
        fn edit_remotely(&mut self, remote_id: &str, bytes: &[u8]) {
            self.clock += 1_000_000;
            self.files.insert(remote_id.to_owned(), (bytes.to_vec(), self.clock));
        }
    }

    impl CloudDrive for FakeDrive {
        fn sign_in(&mut self) -> Result<AccountToken, SyncError> {
            if self.refuse_sign_in {
                return Err(SyncError::SignInCancelled);
            }
            self.sign_ins += 1;
            Ok(AccountToken::new("token"))
        }

        fn upload(
            &mut self,
            _token: &AccountToken,
            name: &str,
            bytes: &[u8],
            remote_id: Option<&str>,
        ) -> Result<RemoteFile, SyncError> {
            if self.offline {
                return Err(SyncError::Network("offline".into()));
            }
            self.clock += 1_000_000;
            let id = remote_id.map(str::to_owned).unwrap_or_else(|| format!("id-{name}"));
            self.files.insert(id.clone(), (bytes.to_vec(), self.clock));
            Ok(RemoteFile { remote_id: id, name: name.to_owned(), modified_at: self.clock })
        }

        fn download(&mut self, _token: &AccountToken, remote_id: &str) -> Result<Vec<u8>, SyncError> {
            self.files
                .get(remote_id)
                .map(|(bytes, _)| bytes.clone())
                .ok_or_else(|| SyncError::NotFound(remote_id.to_owned()))
        }

        fn list_changes(
            &mut self,
            _token: &AccountToken,
            since: i64,
        ) -> Result<Vec<RemoteFile>, SyncError> {
            if self.offline {
                return Err(SyncError::Network("offline".into()));
            }
            Ok(self
                .files
                .iter()
                .filter(|(_, (_, modified))| *modified > since)
                .map(|(id, (_, modified))| RemoteFile {
                    remote_id: id.clone(),
                    name: id.clone(),
                    modified_at: *modified,
                })
                .collect())
        }
    }

    fn local_file(dir: &Path, contents: &[u8]) -> PathBuf {
        let path = dir.join("notes.pdf");
        fs::write(&path, contents).unwrap();
        path
    }

    /// Push the file's mtime forward so a local edit is visible
    fn touch_later(path: &Path, seconds: u64) {
        let later = SystemTime::now() + Duration::from_secs(seconds);
        File::options().write(true).open(path).unwrap().set_modified(later).unwrap();
    }

    #[test]
    fn first_sync_uploads_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), b"v1");
        let conn = open_in_memory().unwrap();
        let mut service = SyncService::new(FakeDrive::default(), &conn);

        assert_eq!(service.sync_file(&path), SyncStatus::Synced);
        assert_eq!(service.drive().files["id-notes.pdf"].0, b"v1");

        let record = SyncMirrorRepository::new(&conn).get(&path.to_string_lossy()).unwrap().unwrap();
        assert_eq!(record.remote_id.as_deref(), Some("id-notes.pdf"));
        assert_eq!(record.status, SyncStatus::Synced);

        // Nothing changed: no second upload, token reused
        assert_eq!(service.sync_file(&path), SyncStatus::Synced);
        assert_eq!(service.drive().sign_ins, 1);
    }

    #[test]
    fn local_edit_uploads_and_remote_edit_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), b"v1");
        let conn = open_in_memory().unwrap();
        let mut service = SyncService::new(FakeDrive::default(), &conn);
        service.sync_file(&path);

        fs::write(&path, b"v2 local").unwrap();
        touch_later(&path, 60);
        assert_eq!(service.sync_file(&path), SyncStatus::Synced);
        assert_eq!(service.drive().files["id-notes.pdf"].0, b"v2 local");

        service.drive_mut().edit_remotely("id-notes.pdf", b"v3 remote");
        assert_eq!(service.sync_file(&path), SyncStatus::Synced);
        assert_eq!(fs::read(&path).unwrap(), b"v3 remote");
    }

    #[test]
    fn edits_on_both_sides_conflict_until_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), b"v1");
        let conn = open_in_memory().unwrap();
        let mut service = SyncService::new(FakeDrive::default(), &conn);
        service.sync_file(&path);

        fs::write(&path, b"local").unwrap();
        touch_later(&path, 60);
        service.drive_mut().edit_remotely("id-notes.pdf", b"remote");

        assert_eq!(service.sync_file(&path), SyncStatus::Conflict);
        assert_eq!(fs::read(&path).unwrap(), b"local");
        assert_eq!(service.drive().files["id-notes.pdf"].0, b"remote");

        assert_eq!(service.resolve_conflict(&path, Resolution::KeepRemote), SyncStatus::Synced);
        assert_eq!(fs::read(&path).unwrap(), b"remote");
        assert_eq!(service.sync_file(&path), SyncStatus::Synced);
    }

    #[test]
    fn failures_are_recorded_with_user_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), b"v1");
        let conn = open_in_memory().unwrap();
        let drive = FakeDrive { offline: true, ..FakeDrive::default() };
        let mut service = SyncService::new(drive, &conn);

        assert_eq!(service.sync_file(&path), SyncStatus::Error);
        let record = SyncMirrorRepository::new(&conn).get(&path.to_string_lossy()).unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Error);
        assert_eq!(
            record.last_error.as_deref(),
            Some(SyncError::Network(String::new()).user_message().as_str())
        );
    }

    #[test]
    fn cancelled_sign_in_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_in_memory().unwrap();
        let drive = FakeDrive { refuse_sign_in: true, ..FakeDrive::default() };
        let mut service = SyncService::new(drive, &conn);

        let path = local_file(dir.path(), b"v1");
        assert_eq!(service.sync_file(&path), SyncStatus::Error);

        let missing = dir.path().join("missing.pdf");
        assert_eq!(service.sync_file(&missing), SyncStatus::Error);
        let record =
            SyncMirrorRepository::new(&conn).get(&missing.to_string_lossy()).unwrap().unwrap();
        assert!(record.last_error.unwrap().starts_with("The local file could not be accessed"));
    }

    #[test]
    fn sync_all_visits_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = local_file(dir.path(), b"v1");
        let conn = open_in_memory().unwrap();
        SyncMirrorRepository::new(&conn)
            .upsert(&SyncRecord::new_local(path.to_string_lossy(), 0))
            .unwrap();

        let mut service = SyncService::new(FakeDrive::default(), &conn);
        let results = service.sync_all();
        assert_eq!(results, vec![(path.to_string_lossy().into_owned(), SyncStatus::Synced)]);
    }
}
