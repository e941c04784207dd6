//! Record sinks
//!
//! A sink persists the listing stubs of one page and reports how many were
//! new and how many were already known. Persisting the same page twice must
//! not create duplicates.

use crate::ListingRecord;
use serde::Serialize;

pub mod csv;
pub mod memory;

pub use memory::MemoryRecordSink;

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV read or write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Buffer flush or sync error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Counts returned by one persist call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistOutcome {
    /// Records never seen before
    pub new_count: u64,
    /// Records whose key already existed
    pub duplicate_count: u64,
}

impl std::ops::AddAssign for PersistOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.new_count += rhs.new_count;
        self.duplicate_count += rhs.duplicate_count;
    }
}

/// Durable, idempotent destination for listing records
pub trait RecordSink: Send + Sync {
    /// Upsert `records` keyed by URL and link them to `collection_id`
    ///
    /// Must be durable when it returns `Ok`.
    fn persist_records(
        &self,
        records: &[ListingRecord],
        collection_id: u64,
    ) -> OutputResult<PersistOutcome>;
}
