//! Run summaries for collections and whole crawls

use crate::fetcher::FetchOutcome;
use crate::output::PersistOutcome;
use serde::Serialize;

/// Why a collection run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum RunStop {
    /// Checkpoint was already done with every page committed
    AlreadyComplete,
    /// Every known page is committed; checkpoint marked done
    Completed,
    /// Stopped at the page cap; checkpoint stays in progress
    PageCap {
        /// Cap in effect
        max_pages: u32,
    },
    /// A page could not be fetched; later pages were not committed
    FetchFailed {
        /// Page that failed
        page: u32,
        /// Failure description
        error: String,
    },
    /// Records or the checkpoint could not be written; committed pages stand
    StoreFailed {
        /// Failure description
        error: String,
    },
    /// Shutdown requested between batches
    Interrupted,
}

impl RunStop {
    /// Build from a failed fetch outcome
    pub fn from_failed_fetch(page: u32, outcome: &FetchOutcome) -> Self {
        let error = match outcome {
            FetchOutcome::HttpError { tier, status } => format!("HTTP {status} on {tier} tier"),
            FetchOutcome::TransportError { tier, error } => format!("{error} on {tier} tier"),
            FetchOutcome::Success { .. } => "no failure".to_string(),
        };
        RunStop::FetchFailed { page, error }
    }

    /// Whether the stop counts as a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, RunStop::FetchFailed { .. } | RunStop::StoreFailed { .. })
    }
}

/// Result of one collection run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSummary {
    /// Collection
    pub collection_id: u64,
    /// Collection name
    pub collection_name: String,
    /// Pages committed during this run
    pub pages_committed: u32,
    /// Highest committed page after the run
    pub last_page: u32,
    /// Known total after the run
    pub total_pages: Option<u32>,
    /// New records persisted during this run
    pub new_records: u64,
    /// Already-known records seen during this run
    pub duplicate_records: u64,
    /// Why the run stopped
    pub stop: RunStop,
}

impl CollectionSummary {
    /// Empty summary for a collection
    pub fn new(collection_id: u64, collection_name: impl Into<String>, stop: RunStop) -> Self {
        Self {
            collection_id,
            collection_name: collection_name.into(),
            pages_committed: 0,
            last_page: 0,
            total_pages: None,
            new_records: 0,
            duplicate_records: 0,
            stop,
        }
    }

    /// Add one committed page
    pub fn add_page(&mut self, page: u32, outcome: PersistOutcome) {
        self.pages_committed += 1;
        self.last_page = page;
        self.new_records += outcome.new_count;
        self.duplicate_records += outcome.duplicate_count;
    }

    /// Whether the run persisted any records, new or not
    pub fn yielded_records(&self) -> bool {
        self.new_records + self.duplicate_records > 0
    }
}

/// Aggregate over every collection in a crawl
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    /// Collections attempted
    pub collections_attempted: usize,
    /// Collections that finished or were already complete
    pub collections_completed: usize,
    /// Pages committed across all collections
    pub pages_committed: u64,
    /// New records across all collections
    pub new_records: u64,
    /// Duplicate records across all collections
    pub duplicate_records: u64,
    /// Collections stopped by a page that could not be fetched
    pub fetch_failures: usize,
    /// Collections stopped by a persistence or checkpoint error
    pub store_failures: usize,
    /// Whether shutdown cut the crawl short
    pub interrupted: bool,
    /// Per-collection summaries in run order
    pub collections: Vec<CollectionSummary>,
}

impl CrawlReport {
    /// Fold in a finished collection run
    pub fn record(&mut self, summary: CollectionSummary) {
        self.collections_attempted += 1;
        self.pages_committed += u64::from(summary.pages_committed);
        self.new_records += summary.new_records;
        self.duplicate_records += summary.duplicate_records;
        match summary.stop {
            RunStop::Completed | RunStop::AlreadyComplete => self.collections_completed += 1,
            RunStop::FetchFailed { .. } => self.fetch_failures += 1,
            RunStop::StoreFailed { .. } => self.store_failures += 1,
            RunStop::Interrupted => self.interrupted = true,
            RunStop::PageCap { .. } => {}
        }
        self.collections.push(summary);
    }

    /// Whether any collection failed
    pub fn has_failures(&self) -> bool {
        self.fetch_failures + self.store_failures > 0
    }
}
