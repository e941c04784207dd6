//! Crawl orchestration and rate limiting
//!
//! # Overview
//!
//! 1. **Selection**: pick collections from a [`crate::collection::CollectionCatalog`]
//! 2. **Driving**: [`CrawlDriver`] runs them one after another, pausing between
//!    collections that yielded records
//! 3. **Pagination**: [`PaginationOrchestrator`] fetches pages in bounded batches
//!    and commits them in order against a checkpoint
//! 4. **Throttling**: [`RateLimiter`] per tier and [`ConcurrencyGate`] per crawl
//!
//! # Components
//!
//! - [`orchestrator`] - checkpointed pagination of one collection
//! - [`driver`] - sequential crawl over many collections
//! - [`gate`] - in-flight request bound
//! - [`rate_limit`] - sliding-window limiter
//! - [`job`] - collection summaries and crawl reports
//! - [`config`] - defaults and policy structs
//!
//! # Error Handling
//!
//! Page fetch failures are values ([`RunStop::FetchFailed`]); they end one
//! collection's run without failing the crawl. [`CrawlError`] covers failures
//! to persist records or checkpoints, and configuration problems. A store failure
//! inside a collection arrives as [`CrawlError::Collection`] carrying the pages
//! committed before it.

pub mod config;
pub mod driver;
pub mod gate;
pub mod job;
pub mod orchestrator;
pub mod rate_limit;

pub use driver::CrawlDriver;
pub use gate::{ConcurrencyGate, GatePermit};
pub use job::{CollectionSummary, CrawlReport, RunStop};
pub use orchestrator::PaginationOrchestrator;
pub use rate_limit::RateLimiter;

use crate::collection::CatalogError;
use crate::fetcher::FetchError;
use crate::output::OutputError;
use crate::resume::{CheckpointError, ResumeError};

/// Crawl errors
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// Record persistence failed
    #[error("output error: {0}")]
    Output(#[from] OutputError),

    /// Checkpoint persistence or run lock failed
    #[error("resume error: {0}")]
    Resume(#[from] ResumeError),

    /// Checkpoint transition rejected
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Collection catalogue could not be loaded
    #[error("catalogue error: {0}")]
    Catalog(#[from] CatalogError),

    /// Fetch layer misconfigured
    #[error("fetch configuration error: {0}")]
    Fetch(#[from] FetchError),

    /// A collection stopped on a store failure after committing `summary`
    #[error(
        "collection {} stopped after {} committed page(s): {source}",
        .summary.collection_id,
        .summary.pages_committed
    )]
    Collection {
        /// Progress made before the failure
        summary: Box<CollectionSummary>,
        /// Underlying store failure
        #[source]
        source: Box<CrawlError>,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for crawl operations
pub type CrawlResult<T> = Result<T, CrawlError>;
