//! Crawl command implementation

use crate::collection::{CollectionCatalog, CollectionFilter, SearchUrlTemplate};
use crate::downloader::config::{
    CooldownConfig, HttpConfig, RetryConfig, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_BATCH_SIZE,
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_INTER_COLLECTION_PAUSE_SECS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_POST_SUCCESS_COOLDOWN_SECS, DEFAULT_PRE_ESCALATION_COOLDOWN_SECS,
    DEFAULT_RATE_CAPACITY, DEFAULT_RATE_WINDOW_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::downloader::{
    ConcurrencyGate, CrawlDriver, CrawlReport, PaginationOrchestrator, RunStop,
};
use crate::fetcher::listing_parser::SearchPageParser;
use crate::fetcher::retry::RetryPolicy;
use crate::fetcher::tier::{build_tiers, TierKind, TierRateLimits, TierSettings};
use crate::fetcher::waterfall::WaterfallClient;
use crate::output::csv::CsvRecordStore;
use crate::resume::FileCheckpointStore;
use crate::shutdown::SharedShutdown;
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

use super::{Cli, CliError, OutputFormat};

/// Maximum allowed search concurrency
const MAX_CONCURRENCY: usize = 32;

/// Parse and validate the concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Crawl command arguments
#[derive(Parser, Debug)]
pub struct CrawlArgs {
    /// Search endpoint of the catalogue (e.g. https://catalogue.example/search)
    #[arg(long, env = "SEARCH_URL")]
    pub search_url: Url,

    /// Base URL that relative listing links resolve against (default: search URL)
    #[arg(long, env = "SITE_URL")]
    pub site_url: Option<Url>,

    /// JSON catalogue of collections: [{"id": 7, "name": "..."}]
    #[arg(long, env = "CATALOGUE", default_value = "collections.json")]
    pub catalogue: PathBuf,

    /// Entity type filter sent with every search
    #[arg(long, env = "ENTITY_TYPE", default_value = "facility")]
    pub entity_type: String,

    /// Only crawl the collection with this name (case-insensitive)
    #[arg(long)]
    pub collection_name: Option<String>,

    /// Only crawl the collection with this id
    #[arg(long)]
    pub collection_id: Option<u64>,

    /// Skip this many selected collections
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Crawl at most this many selected collections
    #[arg(long)]
    pub limit: Option<usize>,

    /// Commit at most this many pages per collection
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_pages: Option<u32>,

    /// Route requests through the configured proxy tiers
    #[arg(long, env = "USE_PROXY", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    pub use_proxy: bool,

    /// Datacenter proxy URL
    #[arg(long, env = "DATACENTER_PROXY_URL")]
    pub datacenter_proxy: Option<Url>,

    /// Residential proxy URL
    #[arg(long, env = "RESIDENTIAL_PROXY_URL")]
    pub residential_proxy: Option<Url>,

    /// Web unlocker proxy URL
    #[arg(long, env = "WEB_UNLOCKER_URL")]
    pub unlocker_proxy: Option<Url>,

    /// Tier every request starts on (direct, datacenter, residential, unlocker; none = direct only)
    #[arg(long, env = "START_TIER")]
    pub start_tier: Option<TierKind>,

    /// Requests admitted on the direct tier per rate window
    #[arg(long, env = "RATE_LIMIT", default_value_t = DEFAULT_RATE_CAPACITY)]
    pub rate_limit: usize,

    /// Requests admitted on the datacenter tier per rate window
    #[arg(long, env = "DATACENTER_RATE_LIMIT", default_value_t = DEFAULT_RATE_CAPACITY)]
    pub datacenter_rate_limit: usize,

    /// Requests admitted on the residential tier per rate window
    #[arg(long, env = "RESIDENTIAL_RATE_LIMIT", default_value_t = DEFAULT_RATE_CAPACITY)]
    pub residential_rate_limit: usize,

    /// Requests admitted on the web unlocker tier per rate window
    #[arg(long, env = "WEB_UNLOCKER_RATE_LIMIT", default_value_t = DEFAULT_RATE_CAPACITY)]
    pub unlocker_rate_limit: usize,

    /// Rate window length in seconds
    #[arg(long, env = "RATE_WINDOW_SECS", default_value_t = DEFAULT_RATE_WINDOW_SECS)]
    pub rate_window_secs: u64,

    /// Pages fetched concurrently per batch (max: 32)
    #[arg(long, env = "SEARCH_CONCURRENCY", default_value_t = DEFAULT_BATCH_SIZE, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Per-attempt request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Attempts per tier before escalating (range: 1-20)
    #[arg(long, env = "MAX_RETRIES", default_value_t = DEFAULT_MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: u32,

    /// Backoff growth factor between retries
    #[arg(long, env = "RETRY_WAIT_MULTIPLIER", default_value_t = DEFAULT_BACKOFF_MULTIPLIER)]
    pub retry_multiplier: f64,

    /// Pause in seconds before escalating onto the costliest tier
    #[arg(long, env = "PRE_ESCALATION_COOLDOWN", default_value_t = DEFAULT_PRE_ESCALATION_COOLDOWN_SECS)]
    pub pre_escalation_cooldown_secs: u64,

    /// Pause in seconds after the costliest tier served a request
    #[arg(long, env = "POST_SUCCESS_COOLDOWN", default_value_t = DEFAULT_POST_SUCCESS_COOLDOWN_SECS)]
    pub post_success_cooldown_secs: u64,

    /// Pause in seconds after a collection that yielded records
    #[arg(long, env = "COLLECTION_PAUSE", default_value_t = DEFAULT_INTER_COLLECTION_PAUSE_SECS)]
    pub collection_pause_secs: u64,
}

impl CrawlArgs {
    fn filter(&self) -> CollectionFilter {
        CollectionFilter {
            name: self.collection_name.clone(),
            id: self.collection_id,
            offset: self.offset,
            limit: self.limit,
        }
    }

    /// Proxies are used only when enabled and the start tier is not direct
    fn tier_settings(&self) -> TierSettings {
        TierSettings {
            use_proxy: self.use_proxy && self.start_tier != Some(TierKind::Direct),
            datacenter: self.datacenter_proxy.clone(),
            residential: self.residential_proxy.clone(),
            unlocker: self.unlocker_proxy.clone(),
            rate_limits: TierRateLimits {
                direct: self.rate_limit,
                datacenter: self.datacenter_rate_limit,
                residential: self.residential_rate_limit,
                unlocker: self.unlocker_rate_limit,
            },
            rate_window: Duration::from_secs(self.rate_window_secs),
        }
    }

    fn retry_config(&self) -> Result<RetryConfig, CliError> {
        if !self.retry_multiplier.is_finite() || self.retry_multiplier < 1.0 {
            return Err(CliError::InvalidArgument(format!(
                "retry multiplier must be at least 1.0, got {}",
                self.retry_multiplier
            )));
        }
        Ok(RetryConfig {
            max_attempts: self.max_retries,
            multiplier: self.retry_multiplier,
            ..RetryConfig::default()
        })
    }

    /// A proxy start tier needs `--use-proxy`
    fn check_start_tier(&self) -> Result<(), CliError> {
        match self.start_tier {
            Some(kind) if kind != TierKind::Direct && !self.use_proxy => {
                Err(CliError::InvalidArgument(format!(
                    "start tier {kind} requires --use-proxy (or USE_PROXY=true)"
                )))
            }
            _ => Ok(()),
        }
    }

    fn build_client(&self) -> Result<WaterfallClient, CliError> {
        self.check_start_tier()?;
        let settings = self.tier_settings();
        let tiers = build_tiers(&settings)?;
        let http = HttpConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        let cooldowns = CooldownConfig {
            pre_escalation: Duration::from_secs(self.pre_escalation_cooldown_secs),
            post_success: Duration::from_secs(self.post_success_cooldown_secs),
        };

        let client = WaterfallClient::with_reqwest(
            tiers,
            &http,
            RetryPolicy::new(self.retry_config()?),
            cooldowns,
        )?;
        match self.start_tier {
            Some(kind) if settings.use_proxy => Ok(client.with_start_tier(kind)?),
            _ => Ok(client),
        }
    }

    /// Execute the crawl and print its report
    pub async fn execute(
        &self,
        cli: &Cli,
        shutdown: SharedShutdown,
    ) -> Result<CrawlReport, CliError> {
        let catalogue = CollectionCatalog::load(&self.catalogue)?;
        let selected = catalogue.select(&self.filter());
        info!(
            catalogue = %self.catalogue.display(),
            available = catalogue.collections().len(),
            selected = selected.len(),
            "Collections selected"
        );

        let client = self.build_client()?;
        info!(
            tiers = ?client.tiers().iter().map(|t| t.kind()).collect::<Vec<_>>(),
            start_tier = %client.start_tier(),
            "Tier waterfall configured"
        );

        let site_url = self.site_url.clone().unwrap_or_else(|| self.search_url.clone());
        let orchestrator = PaginationOrchestrator::new(
            Arc::new(client),
            Arc::new(SearchPageParser::with_defaults(site_url)?),
            Arc::new(CsvRecordStore::open(&cli.records_dir)?),
            Arc::new(FileCheckpointStore::new(&cli.state_dir)?),
            SearchUrlTemplate::new(self.search_url.clone(), &self.entity_type),
            ConcurrencyGate::new(self.concurrency),
        )
        .with_shutdown(shutdown);

        let report = CrawlDriver::new(orchestrator)
            .with_pause(Duration::from_secs(self.collection_pause_secs))
            .with_state_lock(&cli.state_dir)
            .run(&selected, self.max_pages)
            .await?;

        match cli.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string(&report)?),
            OutputFormat::Human => output_human(&report),
        }
        Ok(report)
    }
}

fn describe_stop(stop: &RunStop) -> String {
    match stop {
        RunStop::AlreadyComplete => "already complete".to_string(),
        RunStop::Completed => "completed".to_string(),
        RunStop::PageCap { max_pages } => format!("capped at {max_pages} pages"),
        RunStop::FetchFailed { page, error } => format!("failed on page {page}: {error}"),
        RunStop::StoreFailed { error } => format!("store failed: {error}"),
        RunStop::Interrupted => "interrupted".to_string(),
    }
}

fn output_human(report: &CrawlReport) {
    if report.collections_attempted == 0 {
        println!("No collections crawled");
        return;
    }

    for summary in &report.collections {
        let total = summary
            .total_pages
            .map_or_else(|| "?".to_string(), |t| t.to_string());
        println!(
            "[{}] {}: page {}/{}, +{} new, {} duplicates ({})",
            summary.collection_id,
            summary.collection_name,
            summary.last_page,
            total,
            summary.new_records,
            summary.duplicate_records,
            describe_stop(&summary.stop)
        );
    }

    println!("\nCrawl summary:");
    println!("  Collections attempted: {}", report.collections_attempted);
    println!("  Collections completed: {}", report.collections_completed);
    println!("  Pages committed: {}", report.pages_committed);
    println!("  New records: {}", report.new_records);
    println!("  Duplicate records: {}", report.duplicate_records);
    if report.has_failures() {
        eprintln!("  Fetch failures: {}", report.fetch_failures);
        eprintln!("  Store failures: {}", report.store_failures);
    }
    if report.interrupted {
        println!("  Interrupted: progress saved, re-run to resume");
    }
}
