//! Exclusive run lock on a state directory
//!
//! Two crawls sharing a state directory would interleave checkpoint commits,
//! so a run holds an advisory lock on `<state_dir>/crawler.lock` until it ends.

use super::state::ResumeError;
use fd_lock::RwLock;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the lock file inside the state directory
pub const LOCK_FILE_NAME: &str = "crawler.lock";

/// Held for the lifetime of a crawl run
#[derive(Debug)]
pub struct ResumeLock {
    // The advisory lock is released when this file descriptor closes.
    _lock: RwLock<File>,
    path: PathBuf,
}

impl ResumeLock {
    /// Take the run lock without blocking
    ///
    /// # Errors
    /// Returns [`ResumeError::LockError`] if another process holds it.
    pub fn try_acquire(state_dir: &Path) -> Result<Self, ResumeError> {
        std::fs::create_dir_all(state_dir).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let path = state_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        let mut lock = RwLock::new(file);
        let guard = lock.try_write().map_err(|e| {
            ResumeError::LockError(format!(
                "{} is held by another run ({e})",
                path.display()
            ))
        })?;
        std::mem::forget(guard);

        debug!(path = %path.display(), "Run lock acquired");
        Ok(Self { _lock: lock, path })
    }

    /// Lock file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
