//! Resume capability for collection crawls
//!
//! Per-collection checkpoints with atomic file persistence, schema versioning
//! and a run lock on the state directory.

pub mod checkpoint;
pub mod lock;
pub mod memory;
pub mod state;

pub use checkpoint::{CheckpointError, CheckpointStatus, CollectionCheckpoint};
pub use lock::ResumeLock;
pub use memory::MemoryCheckpointStore;
pub use state::{CheckpointStore, FileCheckpointStore, ResumeError};
