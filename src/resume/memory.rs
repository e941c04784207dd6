//! In-memory checkpoint store for dry runs and tests

use super::checkpoint::CollectionCheckpoint;
use super::state::{CheckpointStore, ResumeError};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    checkpoints: BTreeMap<u64, CollectionCheckpoint>,
    saves: usize,
    fail_after: Option<usize>,
}

/// Checkpoint store kept in a map
///
/// Can be told to fail after a number of successful saves to simulate a crash
/// between a record commit and its checkpoint commit.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<Inner>,
}

impl MemoryCheckpointStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every save after the next `saves` successful ones fail
    pub fn fail_after_saves(&self, saves: usize) {
        let mut inner = self.lock();
        inner.fail_after = Some(inner.saves + saves);
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.lock().fail_after = None;
    }

    /// Successful saves so far
    pub fn saves(&self) -> usize {
        self.lock().saves
    }

    /// Seed a checkpoint without counting a save
    pub fn insert(&self, checkpoint: CollectionCheckpoint) {
        self.lock()
            .checkpoints
            .insert(checkpoint.collection_id(), checkpoint);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load_checkpoint(&self, collection_id: u64) -> Result<Option<CollectionCheckpoint>, ResumeError> {
        Ok(self.lock().checkpoints.get(&collection_id).cloned())
    }

    fn save_checkpoint(&self, checkpoint: &CollectionCheckpoint) -> Result<(), ResumeError> {
        let mut inner = self.lock();
        if inner.fail_after.is_some_and(|limit| inner.saves >= limit) {
            return Err(ResumeError::IoError("injected checkpoint failure".to_string()));
        }
        inner
            .checkpoints
            .insert(checkpoint.collection_id(), checkpoint.clone());
        inner.saves += 1;
        Ok(())
    }

    fn list_checkpoints(&self) -> Result<Vec<CollectionCheckpoint>, ResumeError> {
        Ok(self.lock().checkpoints.values().cloned().collect())
    }
}
