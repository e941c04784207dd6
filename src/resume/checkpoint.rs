//! Per-collection pagination checkpoint
//!
//! A checkpoint records the highest page whose records are durably persisted.
//! Pages are committed strictly in order: `last_page_scraped` only ever moves
//! forward by one, so every page up to it is known to be stored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a collection's pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// Nothing committed yet
    #[default]
    Pending,
    /// Some pages committed
    InProgress,
    /// Every known page committed
    Done,
}

impl CheckpointStatus {
    /// Stable name used in state files and CLI output
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::InProgress => "in_progress",
            CheckpointStatus::Done => "done",
        }
    }
}

impl fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointStatus {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CheckpointStatus::Pending),
            "in_progress" => Ok(CheckpointStatus::InProgress),
            "done" => Ok(CheckpointStatus::Done),
            other => Err(CheckpointError::Invalid(format!("unknown status '{other}'"))),
        }
    }
}

/// Checkpoint transition and consistency errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckpointError {
    /// Commit attempted out of page order
    #[error("collection {collection_id}: expected to commit page {expected}, got page {found}")]
    NonContiguous {
        /// Collection
        collection_id: u64,
        /// `last_page_scraped + 1`
        expected: u32,
        /// Page offered
        found: u32,
    },

    /// Completion attempted before the last known page was committed
    #[error("collection {collection_id}: cannot mark done at page {last} of {total:?}")]
    NotComplete {
        /// Collection
        collection_id: u64,
        /// Highest committed page
        last: u32,
        /// Known total, if any
        total: Option<u32>,
    },

    /// Loaded checkpoint breaks an invariant
    #[error("invalid checkpoint: {0}")]
    Invalid(String),
}

/// Durable pagination progress for one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCheckpoint {
    collection_id: u64,
    last_page_scraped: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_pages: Option<u32>,
    status: CheckpointStatus,
    created_at: i64,
    updated_at: i64,
}

impl CollectionCheckpoint {
    /// Fresh pending checkpoint
    pub fn new(collection_id: u64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            collection_id,
            last_page_scraped: 0,
            total_pages: None,
            status: CheckpointStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Collection this checkpoint belongs to
    pub fn collection_id(&self) -> u64 {
        self.collection_id
    }

    /// Highest page durably committed (0 before the first)
    pub fn last_page_scraped(&self) -> u32 {
        self.last_page_scraped
    }

    /// Total page count, once known
    pub fn total_pages(&self) -> Option<u32> {
        self.total_pages
    }

    /// Current status
    pub fn status(&self) -> CheckpointStatus {
        self.status
    }

    /// Creation time (Unix millis)
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Last update time (Unix millis)
    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    /// Next page to fetch
    pub fn next_page(&self) -> u32 {
        self.last_page_scraped.saturating_add(1)
    }

    /// Whether every known page has been committed
    pub fn is_complete(&self) -> bool {
        matches!(self.total_pages, Some(total) if self.last_page_scraped >= total)
    }

    /// A `done` checkpoint that stops short of its total
    ///
    /// Written by older runs that marked a collection done after a page cap.
    pub fn is_capped(&self) -> bool {
        self.status == CheckpointStatus::Done && !self.is_complete()
    }

    /// Whether a run has nothing left to do
    pub fn is_finished(&self) -> bool {
        self.status == CheckpointStatus::Done && self.is_complete()
    }

    /// Merge a freshly observed page count
    ///
    /// The stored total never shrinks, so a page beyond a temporarily smaller
    /// count is not lost.
    pub fn observe_total_pages(&mut self, total: u32) {
        let total = total.max(1);
        self.total_pages = Some(self.total_pages.map_or(total, |known| known.max(total)));
        self.touch();
    }

    /// Enter `in_progress` (also reopens a capped `done` checkpoint)
    pub fn begin(&mut self) {
        if self.status != CheckpointStatus::InProgress {
            self.status = CheckpointStatus::InProgress;
            self.touch();
        }
    }

    /// Record `page` as committed
    ///
    /// # Errors
    /// Returns [`CheckpointError::NonContiguous`] unless `page == last_page_scraped + 1`.
    pub fn advance_to(&mut self, page: u32) -> Result<(), CheckpointError> {
        let expected = self.next_page();
        if page != expected {
            return Err(CheckpointError::NonContiguous {
                collection_id: self.collection_id,
                expected,
                found: page,
            });
        }
        self.last_page_scraped = page;
        if self.status == CheckpointStatus::Pending {
            self.status = CheckpointStatus::InProgress;
        }
        self.touch();
        Ok(())
    }

    /// Mark the collection done
    ///
    /// # Errors
    /// Returns [`CheckpointError::NotComplete`] unless every known page is committed.
    pub fn mark_done(&mut self) -> Result<(), CheckpointError> {
        if !self.is_complete() {
            return Err(CheckpointError::NotComplete {
                collection_id: self.collection_id,
                last: self.last_page_scraped,
                total: self.total_pages,
            });
        }
        self.status = CheckpointStatus::Done;
        self.touch();
        Ok(())
    }

    /// Check invariants of a loaded checkpoint
    pub fn validate(&self) -> Result<(), CheckpointError> {
        if let Some(total) = self.total_pages {
            if total == 0 {
                return Err(CheckpointError::Invalid(format!(
                    "collection {}: total_pages must be at least 1",
                    self.collection_id
                )));
            }
            if self.last_page_scraped > total {
                return Err(CheckpointError::Invalid(format!(
                    "collection {}: last page {} exceeds total {}",
                    self.collection_id, self.last_page_scraped, total
                )));
            }
        }
        match self.status {
            CheckpointStatus::Pending if self.last_page_scraped > 0 => {
                Err(CheckpointError::Invalid(format!(
                    "collection {}: pending with {} pages committed",
                    self.collection_id, self.last_page_scraped
                )))
            }
            CheckpointStatus::Done if self.total_pages.is_none() => {
                Err(CheckpointError::Invalid(format!(
                    "collection {}: done without a known total",
                    self.collection_id
                )))
            }
            _ => Ok(()),
        }
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}
