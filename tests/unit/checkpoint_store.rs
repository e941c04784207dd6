//! Unit tests for file-backed checkpoint persistence

use catalogue_crawler::resume::{
    CheckpointError, CheckpointStatus, CheckpointStore, CollectionCheckpoint, FileCheckpointStore,
    ResumeError,
};
use tempfile::TempDir;

fn checkpoint(id: u64, total: u32, committed: u32) -> CollectionCheckpoint {
    let mut cp = CollectionCheckpoint::new(id);
    cp.observe_total_pages(total);
    for page in 1..=committed {
        cp.advance_to(page).unwrap();
    }
    cp
}

#[test]
fn test_checkpoint_survives_store_reopen() {
    let dir = TempDir::new().unwrap();
    let mut cp = checkpoint(11, 3, 3);
    cp.mark_done().unwrap();
    FileCheckpointStore::new(dir.path())
        .unwrap()
        .save_checkpoint(&cp)
        .unwrap();

    let reopened = FileCheckpointStore::new(dir.path()).unwrap();
    let loaded = reopened.load_checkpoint(11).unwrap().unwrap();
    assert_eq!(loaded.status(), CheckpointStatus::Done);
    assert!(loaded.is_finished());
    assert_eq!(loaded.total_pages(), Some(3));
}

#[test]
fn test_save_replaces_previous_checkpoint() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(dir.path()).unwrap();

    store.save_checkpoint(&checkpoint(5, 10, 2)).unwrap();
    store.save_checkpoint(&checkpoint(5, 10, 6)).unwrap();

    assert_eq!(store.load_checkpoint(5).unwrap().unwrap().last_page_scraped(), 6);
    assert_eq!(store.checkpoint_files().unwrap().len(), 1);
}

#[test]
fn test_file_format_is_versioned_json() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(dir.path()).unwrap();
    store.save_checkpoint(&checkpoint(3, 4, 1)).unwrap();

    let raw = std::fs::read_to_string(store.path_for(3)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["schema_version"], "1.0.0");
    assert_eq!(json["checkpoint"]["collection_id"], 3);
    assert_eq!(json["checkpoint"]["last_page_scraped"], 1);
    assert_eq!(json["checkpoint"]["total_pages"], 4);
    assert_eq!(json["checkpoint"]["status"], "in_progress");
}

#[test]
fn test_inconsistent_checkpoint_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(dir.path()).unwrap();
    std::fs::write(
        store.path_for(8),
        r#"{"schema_version":"1.0.0","checkpoint":{"collection_id":8,"last_page_scraped":9,
            "total_pages":4,"status":"in_progress","created_at":0,"updated_at":0}}"#,
    )
    .unwrap();

    assert!(matches!(
        store.load_checkpoint(8),
        Err(ResumeError::Checkpoint(CheckpointError::Invalid(_)))
    ));
}

#[test]
fn test_truncated_file_is_a_deserialization_error() {
    let dir = TempDir::new().unwrap();
    let store = FileCheckpointStore::new(dir.path()).unwrap();
    std::fs::write(store.path_for(2), r#"{"schema_version":"1.0.0","checkp"#).unwrap();

    assert!(matches!(
        store.load_checkpoint(2),
        Err(ResumeError::DeserializationError(_))
    ));
}

#[test]
fn test_non_contiguous_advance_rejected() {
    let mut cp = checkpoint(1, 10, 2);
    let err = cp.advance_to(4).unwrap_err();
    assert!(matches!(
        err,
        CheckpointError::NonContiguous {
            expected: 3,
            found: 4,
            ..
        }
    ));
    assert_eq!(cp.last_page_scraped(), 2);
}

#[test]
fn test_done_requires_every_known_page() {
    let mut cp = checkpoint(1, 5, 4);
    assert!(cp.mark_done().is_err());
    cp.advance_to(5).unwrap();
    cp.mark_done().unwrap();
    assert_eq!(cp.status(), CheckpointStatus::Done);
}
