//! Checkpointed pagination of one collection
//!
//! Page 1 is fetched alone to learn the page count. Later pages are fetched in
//! concurrent batches, but committed strictly in page order: each page's
//! records are persisted first, then the checkpoint advances to that page. The
//! first page in a batch that cannot be fetched ends the run, and nothing after
//! it is committed, even if it was fetched.
//!
//! The page count is read from page 1 only. Later pages never change it.

use crate::collection::{Collection, SearchUrlTemplate};
use crate::downloader::gate::ConcurrencyGate;
use crate::downloader::job::{CollectionSummary, RunStop};
use crate::downloader::CrawlError;
use crate::fetcher::listing_parser::{PageParser, ParsedPage};
use crate::fetcher::tier::TierKind;
use crate::fetcher::{FetchOutcome, PageFetcher};
use crate::metrics::CollectionMetrics;
use crate::output::{PersistOutcome, RecordSink};
use crate::resume::{CheckpointStore, CollectionCheckpoint};
use crate::shutdown::SharedShutdown;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Drives one collection from its checkpoint to completion or the page cap
pub struct PaginationOrchestrator {
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn PageParser>,
    sink: Arc<dyn RecordSink>,
    store: Arc<dyn CheckpointStore>,
    urls: SearchUrlTemplate,
    gate: ConcurrencyGate,
    batch_size: usize,
    min_tier: Option<TierKind>,
    shutdown: Option<SharedShutdown>,
}

impl PaginationOrchestrator {
    /// Create an orchestrator; the batch size defaults to the gate capacity
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        parser: Arc<dyn PageParser>,
        sink: Arc<dyn RecordSink>,
        store: Arc<dyn CheckpointStore>,
        urls: SearchUrlTemplate,
        gate: ConcurrencyGate,
    ) -> Self {
        Self {
            fetcher,
            parser,
            sink,
            store,
            urls,
            batch_size: gate.capacity(),
            gate,
            min_tier: None,
            shutdown: None,
        }
    }

    /// Pages launched together per batch (at least 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Start every fetch no cheaper than `tier`
    pub fn with_min_tier(mut self, tier: Option<TierKind>) -> Self {
        self.min_tier = tier;
        self
    }

    /// Stop between batches once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Shutdown handle in use
    pub fn shutdown(&self) -> Option<&SharedShutdown> {
        self.shutdown.as_ref()
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
    }

    /// Paginate `collection`, committing pages up to `max_pages` when given
    ///
    /// A page that cannot be fetched is not an error: the run stops there and
    /// the summary says so. A persistence or checkpoint failure returns
    /// [`CrawlError::Collection`], which still carries the summary of the pages
    /// committed before it. The collection's stored state stays consistent.
    pub async fn run(
        &self,
        collection: &Collection,
        max_pages: Option<u32>,
    ) -> Result<CollectionSummary, CrawlError> {
        let span = info_span!("collection", id = collection.id, name = %collection.name);
        async {
            let metrics = CollectionMetrics::start(collection.id);
            let mut summary =
                CollectionSummary::new(collection.id, &collection.name, RunStop::Completed);
            match self.paginate(collection, max_pages, &metrics, &mut summary).await {
                Ok(()) => {
                    if summary.stop.is_failure() {
                        metrics.record_failure("fetch_failed");
                    } else {
                        metrics.record_success(summary.pages_committed);
                    }
                    Ok(summary)
                }
                Err(source) => {
                    metrics.record_failure("store_failed");
                    error!(
                        pages_committed = summary.pages_committed,
                        error = %source,
                        "Collection stopped on a store failure"
                    );
                    summary.stop = RunStop::StoreFailed {
                        error: source.to_string(),
                    };
                    Err(CrawlError::Collection {
                        summary: Box::new(summary),
                        source: Box::new(source),
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn paginate(
        &self,
        collection: &Collection,
        max_pages: Option<u32>,
        metrics: &CollectionMetrics,
        summary: &mut CollectionSummary,
    ) -> Result<(), CrawlError> {
        let mut checkpoint = match self.store.load_checkpoint(collection.id)? {
            Some(checkpoint) => checkpoint,
            None => {
                let checkpoint = CollectionCheckpoint::new(collection.id);
                self.store.save_checkpoint(&checkpoint)?;
                checkpoint
            }
        };

        if checkpoint.is_finished() {
            info!(
                last_page = checkpoint.last_page_scraped(),
                "Collection already fully scraped, skipping"
            );
            summary.stop = RunStop::AlreadyComplete;
            Self::sync(summary, &checkpoint);
            return Ok(());
        }

        if checkpoint.is_capped() {
            info!(
                last_page = checkpoint.last_page_scraped(),
                total_pages = ?checkpoint.total_pages(),
                "Collection was previously capped, resuming"
            );
            let mut next = checkpoint.clone();
            next.begin();
            self.store.save_checkpoint(&next)?;
            checkpoint = next;
        } else if checkpoint.last_page_scraped() > 0 {
            info!(
                next_page = checkpoint.next_page(),
                total_pages = ?checkpoint.total_pages(),
                "Resuming collection"
            );
        } else {
            info!("Starting collection");
        }
        Self::sync(summary, &checkpoint);

        if checkpoint.total_pages().is_none() && checkpoint.last_page_scraped() > 0 {
            if let Some(stop) = self.refresh_total_pages(collection, &mut checkpoint).await? {
                summary.stop = stop;
                Self::sync(summary, &checkpoint);
                return Ok(());
            }
        }

        loop {
            let total = checkpoint.total_pages().unwrap_or(1);
            let effective_last = max_pages.map_or(total, |cap| total.min(cap));
            let start = checkpoint.next_page();
            if start > effective_last {
                break;
            }
            if self.shutdown_requested() {
                warn!(next_page = start, "Shutdown requested, stopping between batches");
                summary.stop = RunStop::Interrupted;
                Self::sync(summary, &checkpoint);
                return Ok(());
            }

            // Without a known total only page 1 is fetched
            let batch_len = if checkpoint.total_pages().is_none() {
                1
            } else {
                self.batch_size
            };
            let end = start
                .saturating_add(u32::try_from(batch_len).unwrap_or(u32::MAX) - 1)
                .min(effective_last);
            let pages: Vec<u32> = (start..=end).collect();
            debug!(start, end, "Fetching batch");

            let outcomes = join_all(pages.iter().map(|&page| self.fetch(collection, page))).await;

            for (page, outcome) in pages.into_iter().zip(outcomes) {
                match outcome {
                    FetchOutcome::Success { tier, page: fetched } => {
                        let parsed = self.parser.parse_page(&fetched.body);
                        let persisted = self.commit_page(&mut checkpoint, page, &parsed)?;
                        metrics.record_page(persisted.new_count, persisted.duplicate_count);
                        summary.add_page(page, persisted);
                        Self::sync(summary, &checkpoint);
                        info!(
                            page,
                            total_pages = ?checkpoint.total_pages(),
                            tier = %tier,
                            new = persisted.new_count,
                            duplicates = persisted.duplicate_count,
                            "Page committed"
                        );
                    }
                    failed => {
                        error!(
                            page,
                            tier = %failed.tier(),
                            "Page could not be fetched, stopping collection"
                        );
                        summary.stop = RunStop::from_failed_fetch(page, &failed);
                        Self::sync(summary, &checkpoint);
                        return Ok(());
                    }
                }
            }
        }

        if checkpoint.is_complete() {
            let mut next = checkpoint.clone();
            next.mark_done()?;
            self.store.save_checkpoint(&next)?;
            checkpoint = next;
            summary.stop = RunStop::Completed;
            info!(
                pages = checkpoint.last_page_scraped(),
                new = summary.new_records,
                duplicates = summary.duplicate_records,
                "Collection complete"
            );
        } else {
            let cap = max_pages.unwrap_or(checkpoint.last_page_scraped());
            summary.stop = RunStop::PageCap { max_pages: cap };
            info!(
                last_page = checkpoint.last_page_scraped(),
                total_pages = ?checkpoint.total_pages(),
                max_pages = cap,
                "Page cap reached, collection stays in progress"
            );
        }

        Self::sync(summary, &checkpoint);
        Ok(())
    }

    /// Learn the page count for a checkpoint that lost it, without advancing
    async fn refresh_total_pages(
        &self,
        collection: &Collection,
        checkpoint: &mut CollectionCheckpoint,
    ) -> Result<Option<RunStop>, CrawlError> {
        match self.fetch(collection, 1).await {
            FetchOutcome::Success { page, .. } => {
                let parsed = self.parser.parse_page(&page.body);
                let mut next = checkpoint.clone();
                next.observe_total_pages(parsed.total_pages);
                self.store.save_checkpoint(&next)?;
                *checkpoint = next;
                Ok(None)
            }
            failed => Ok(Some(RunStop::from_failed_fetch(1, &failed))),
        }
    }

    async fn fetch(&self, collection: &Collection, page: u32) -> FetchOutcome {
        let url = self.urls.page_url(collection, page);
        let _permit = self.gate.enter().await;
        debug!(page, url = %url, "Fetching page");
        self.fetcher.fetch(&url, self.min_tier).await
    }

    /// Persist a page's records, then advance the checkpoint to it
    ///
    /// In-memory state only moves once the checkpoint is durably saved.
    fn commit_page(
        &self,
        checkpoint: &mut CollectionCheckpoint,
        page: u32,
        parsed: &ParsedPage,
    ) -> Result<PersistOutcome, CrawlError> {
        let persisted = self
            .sink
            .persist_records(&parsed.records, checkpoint.collection_id())?;

        let mut next = checkpoint.clone();
        if page == 1 {
            next.observe_total_pages(parsed.total_pages);
        }
        next.advance_to(page)?;
        self.store.save_checkpoint(&next)?;
        *checkpoint = next;
        Ok(persisted)
    }

    fn sync(summary: &mut CollectionSummary, checkpoint: &CollectionCheckpoint) {
        summary.last_page = checkpoint.last_page_scraped();
        summary.total_pages = checkpoint.total_pages();
    }
}
