//! # Catalogue Crawler Library
//!
//! A resilient crawler for large paginated catalogues that are split into
//! independent collections. It is built for hostile rate limiting and for
//! unattended runs that must survive restarts.
//!
//! ## Features
//!
//! - **Tier Waterfall**: each request starts on the cheapest network tier (direct,
//!   datacenter proxy, residential proxy, web unlocker) and escalates only when it fails
//! - **Sliding-Window Throttling**: every tier owns its own [`downloader::RateLimiter`]
//! - **Bounded Retries**: exponential backoff within a tier before escalating
//! - **Checkpointed Pagination**: per-collection progress is persisted page by page,
//!   strictly in page order, so a restarted run never skips or double-counts a page
//! - **Idempotent Persistence**: listing records are upserted by URL
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use catalogue_crawler::collection::{Collection, SearchUrlTemplate};
//! use catalogue_crawler::downloader::{ConcurrencyGate, PaginationOrchestrator};
//! use catalogue_crawler::fetcher::listing_parser::SearchPageParser;
//! use catalogue_crawler::fetcher::waterfall::WaterfallClient;
//! use catalogue_crawler::output::csv::CsvRecordStore;
//! use catalogue_crawler::resume::FileCheckpointStore;
//!
//! # async fn example(client: WaterfallClient) -> Result<(), Box<dyn std::error::Error>> {
//! let base = url::Url::parse("https://catalogue.example/search")?;
//! let orchestrator = PaginationOrchestrator::new(
//!     Arc::new(client),
//!     Arc::new(SearchPageParser::with_defaults(base.clone())?),
//!     Arc::new(CsvRecordStore::open("./records")?),
//!     Arc::new(FileCheckpointStore::new("./state")?),
//!     SearchUrlTemplate::new(base, "facility"),
//!     ConcurrencyGate::new(5),
//! );
//!
//! let collection = Collection::new(7, "cardiology");
//! let summary = orchestrator.run(&collection, None).await?;
//! println!("{} new records", summary.new_records);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - tiers, retry policy, waterfall client and the listing parser
//! - [`downloader`] - rate limiter, concurrency gate, pagination orchestrator, crawl driver
//! - [`resume`] - collection checkpoints and their durable stores
//! - [`output`] - record sinks (CSV upsert store, in-memory sink)
//! - [`collection`] - collection catalogue, selection filters and page URLs

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// CLI command implementations
pub mod cli;

/// Collection catalogue and page URL construction
pub mod collection;

/// Rate limiting, pagination orchestration and the crawl driver
pub mod downloader;

/// Network tiers, retries, the waterfall client and page parsing
pub mod fetcher;

/// Prometheus metrics
pub mod metrics;

/// Record sinks
pub mod output;

/// Collection checkpoints and resume state
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use collection::Collection;
pub use fetcher::tier::TierKind;
pub use resume::{CheckpointStatus, CollectionCheckpoint};

/// A listing stub extracted from one search result page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingRecord {
    /// Display name of the listing
    pub name: String,
    /// Absolute URL of the listing profile; the deduplication key
    pub url: String,
    /// Free-text categories shown next to the listing (may be empty)
    pub categories: String,
}

impl ListingRecord {
    /// Create a new listing record
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        categories: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            categories: categories.into(),
        }
    }

    /// Validate record integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Listing name cannot be empty".to_string());
        }

        if self.url.trim().is_empty() {
            return Err("Listing URL cannot be empty".to_string());
        }

        Ok(())
    }
}
