use pdf_annotator_storage::{SyncRecord, SyncStatus};

/// Decide which way a document has to move
///
/// `local_modified_at` is the current local modification time and
/// `remote_modified_at` the current remote one (`None` when the remote copy
/// is gone). Both are compared with the times stored at the last sync.
pub fn classify(
    record: &SyncRecord,
    local_modified_at: i64,
    remote_modified_at: Option<i64>,
) -> SyncStatus {
    if record.remote_id.is_none() {
        return SyncStatus::PendingUpload;
    }
    let Some(remote) = remote_modified_at else {
        return SyncStatus::PendingUpload;
    };

    let local_changed = local_modified_at > record.local_modified_at;
    let remote_changed = record.remote_modified_at.map_or(true, |last| remote > last);

    match (local_changed, remote_changed) {
        (true, true) => SyncStatus::Conflict,
        (true, false) => SyncStatus::PendingUpload,
        (false, true) => SyncStatus::PendingDownload,
        (false, false) => SyncStatus::Synced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced(local: i64, remote: i64) -> SyncRecord {
        SyncRecord {
            local_path: "/docs/a.pdf".to_owned(),
            remote_id: Some("r1".to_owned()),
            local_modified_at: local,
            remote_modified_at: Some(remote),
            status: SyncStatus::Synced,
            last_error: None,
        }
    }

    #[test]
    fn never_uploaded_goes_up() {
        let record = SyncRecord::new_local("/docs/a.pdf", 10);
        assert_eq!(classify(&record, 10, None), SyncStatus::PendingUpload);
    }

    #[test]
    fn compares_both_sides() {
        let record = synced(100, 200);
        assert_eq!(classify(&record, 100, Some(200)), SyncStatus::Synced);
        assert_eq!(classify(&record, 150, Some(200)), SyncStatus::PendingUpload);
        assert_eq!(classify(&record, 100, Some(250)), SyncStatus::PendingDownload);
        assert_eq!(classify(&record, 150, Some(250)), SyncStatus::Conflict);
    }

    #[test]
    fn missing_remote_is_reuploaded() {
        assert_eq!(classify(&synced(100, 200), 100, None), SyncStatus::PendingUpload);
    }
}
