//! Durable checkpoint storage
//!
//! One JSON file per collection, written atomically (temp file, fsync, rename,
//! directory fsync) under an advisory lock, and stamped with a schema version.

use super::checkpoint::{CheckpointError, CollectionCheckpoint};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Current checkpoint file schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed checkpoint file size (1 MB)
pub const MAX_STATE_FILE_SIZE: u64 = 1024 * 1024;

const FILE_PREFIX: &str = "collection_";
const FILE_EXTENSION: &str = "json";

/// Loads and saves collection checkpoints
pub trait CheckpointStore: Send + Sync {
    /// Checkpoint for `collection_id`, or `None` if never saved
    fn load_checkpoint(&self, collection_id: u64) -> Result<Option<CollectionCheckpoint>, ResumeError>;

    /// Durably replace the checkpoint for its collection
    fn save_checkpoint(&self, checkpoint: &CollectionCheckpoint) -> Result<(), ResumeError>;

    /// Every stored checkpoint, ordered by collection id
    fn list_checkpoints(&self) -> Result<Vec<CollectionCheckpoint>, ResumeError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    schema_version: String,
    checkpoint: CollectionCheckpoint,
}

/// File-backed checkpoint store
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Open (and create) the state directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ResumeError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| ResumeError::IoError(e.to_string()))?;
        Ok(Self { dir })
    }

    /// State directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint file for `collection_id`
    pub fn path_for(&self, collection_id: u64) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{collection_id}.{FILE_EXTENSION}"))
    }

    /// Checkpoint files in the state directory, sorted by path
    pub fn checkpoint_files(&self) -> Result<Vec<PathBuf>, ResumeError> {
        let mut files = Vec::new();
        let entries = std::fs::read_dir(&self.dir).map_err(|e| ResumeError::IoError(e.to_string()))?;
        for entry in entries {
            let path = entry.map_err(|e| ResumeError::IoError(e.to_string()))?.path();
            if is_checkpoint_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read and validate one checkpoint file
    pub fn read_file(path: &Path) -> Result<CollectionCheckpoint, ResumeError> {
        let lock_file = open_lock_file(path)?;
        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_STATE_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_STATE_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        let file: CheckpointFile = serde_json::from_str(&contents).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Failed to deserialize checkpoint");
            ResumeError::DeserializationError(e.to_string())
        })?;

        if file.schema_version != SCHEMA_VERSION {
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: file.schema_version,
            });
        }
        file.checkpoint.validate()?;
        Ok(file.checkpoint)
    }
}

fn is_checkpoint_file(path: &Path) -> bool {
    let stem_ok = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix(FILE_PREFIX))
        .is_some_and(|id| id.parse::<u64>().is_ok());
    stem_ok && path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION)
}

fn open_lock_file(path: &Path) -> Result<File, ResumeError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path.with_extension("lock"))
        .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))
}

impl CheckpointStore for FileCheckpointStore {
    fn load_checkpoint(&self, collection_id: u64) -> Result<Option<CollectionCheckpoint>, ResumeError> {
        let path = self.path_for(collection_id);
        if !path.exists() {
            return Ok(None);
        }
        let checkpoint = Self::read_file(&path)?;
        if checkpoint.collection_id() != collection_id {
            return Err(ResumeError::Checkpoint(CheckpointError::Invalid(format!(
                "{} holds collection {}",
                path.display(),
                checkpoint.collection_id()
            ))));
        }
        debug!(
            collection_id,
            last_page = checkpoint.last_page_scraped(),
            status = %checkpoint.status(),
            "Checkpoint loaded"
        );
        Ok(Some(checkpoint))
    }

    fn save_checkpoint(&self, checkpoint: &CollectionCheckpoint) -> Result<(), ResumeError> {
        let path = self.path_for(checkpoint.collection_id());
        let json = serde_json::to_string_pretty(&CheckpointFile {
            schema_version: SCHEMA_VERSION.to_string(),
            checkpoint: checkpoint.clone(),
        })
        .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let mut lock = RwLock::new(open_lock_file(&path)?);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(&path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        if let Ok(dir) = File::open(&self.dir) {
            let _ = dir.sync_all();
        }

        debug!(
            path = %path.display(),
            last_page = checkpoint.last_page_scraped(),
            status = %checkpoint.status(),
            "Checkpoint saved"
        );
        Ok(())
    }

    fn list_checkpoints(&self) -> Result<Vec<CollectionCheckpoint>, ResumeError> {
        let mut checkpoints = self
            .checkpoint_files()?
            .iter()
            .map(|path| Self::read_file(path))
            .collect::<Result<Vec<_>, _>>()?;
        checkpoints.sort_by_key(CollectionCheckpoint::collection_id);
        Ok(checkpoints)
    }
}

/// Errors related to resume state
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// Stored checkpoint breaks an invariant
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}
