//! Sequential crawl over a selection of collections

use crate::collection::Collection;
use crate::downloader::job::CrawlReport;
use crate::downloader::orchestrator::PaginationOrchestrator;
use crate::downloader::CrawlError;
use crate::resume::ResumeLock;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Runs collections one after another through a [`PaginationOrchestrator`]
pub struct CrawlDriver {
    orchestrator: PaginationOrchestrator,
    pause: Duration,
    lock_dir: Option<PathBuf>,
}

impl CrawlDriver {
    /// Driver without a pause between collections
    pub fn new(orchestrator: PaginationOrchestrator) -> Self {
        Self {
            orchestrator,
            pause: Duration::ZERO,
            lock_dir: None,
        }
    }

    /// Pause after every collection that yielded records (except the last)
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Hold the run lock on `state_dir` for the duration of [`CrawlDriver::run`]
    pub fn with_state_lock(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(state_dir.into());
        self
    }

    /// Crawl `collections` in order
    ///
    /// A collection that fails, whether on a page fetch or on persistence, is
    /// counted in the report with the pages it committed, and the crawl moves
    /// on. Any other error, such as failing to take the run lock, aborts the
    /// whole crawl.
    pub async fn run(
        &self,
        collections: &[Collection],
        max_pages: Option<u32>,
    ) -> Result<CrawlReport, CrawlError> {
        let mut report = CrawlReport::default();
        if collections.is_empty() {
            warn!("No collections matched the selection, nothing to crawl");
            return Ok(report);
        }

        let _lock = self
            .lock_dir
            .as_deref()
            .map(ResumeLock::try_acquire)
            .transpose()?;

        info!(
            collections = collections.len(),
            max_pages = ?max_pages,
            "Starting crawl"
        );

        for (index, collection) in collections.iter().enumerate() {
            if self.shutdown_requested() {
                warn!(remaining = collections.len() - index, "Shutdown requested, ending crawl");
                report.interrupted = true;
                break;
            }

            let yielded = match self.orchestrator.run(collection, max_pages).await {
                Ok(summary) => {
                    let yielded = summary.yielded_records();
                    report.record(summary);
                    yielded
                }
                Err(CrawlError::Collection { summary, source }) => {
                    error!(
                        collection_id = collection.id,
                        collection = %collection.name,
                        pages_committed = summary.pages_committed,
                        error = %source,
                        "Collection failed"
                    );
                    let yielded = summary.yielded_records();
                    report.record(*summary);
                    yielded
                }
                Err(e) => return Err(e),
            };

            let is_last = index + 1 == collections.len();
            if yielded && !is_last && !self.pause.is_zero() {
                info!(
                    pause_secs = self.pause.as_secs_f64(),
                    "Pausing before next collection"
                );
                if !self.sleep(self.pause).await {
                    report.interrupted = true;
                    break;
                }
            }
        }

        info!(
            attempted = report.collections_attempted,
            completed = report.collections_completed,
            pages = report.pages_committed,
            new = report.new_records,
            duplicates = report.duplicate_records,
            fetch_failures = report.fetch_failures,
            store_failures = report.store_failures,
            "Crawl finished"
        );
        Ok(report)
    }

    fn shutdown_requested(&self) -> bool {
        self.orchestrator
            .shutdown()
            .is_some_and(|s| s.is_shutdown_requested())
    }

    /// Returns `false` if shutdown interrupted the pause
    async fn sleep(&self, duration: Duration) -> bool {
        match self.orchestrator.shutdown() {
            Some(shutdown) => shutdown.sleep(duration).await,
            None => {
                tokio::time::sleep(duration).await;
                true
            }
        }
    }
}
