//! Crawl observability metrics
//!
//! Counters, histograms and gauges for tier attempts, retries, escalations,
//! cooldowns, rate limiter waits and collection outcomes.
//!
//! ## Architecture
//!
//! - Uses the `metrics` facade; calls are no-ops until a recorder is installed
//! - [`init_metrics`] installs a Prometheus exporter with a scrape endpoint
//! - Every series carries a `tier` or `collection` label where one applies

use crate::fetcher::tier::TierKind;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<RwLock<bool>> = Lazy::new(|| RwLock::new(false));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize the Prometheus exporter and register metric descriptions
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address for the scrape endpoint (e.g. "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "tier_requests_total",
        Unit::Count,
        "Request attempts per tier and outcome"
    );
    describe_histogram!(
        "tier_request_duration_seconds",
        Unit::Seconds,
        "Duration of a single request attempt"
    );
    describe_counter!(
        "tier_retries_total",
        Unit::Count,
        "Retries scheduled within a tier"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Backoff slept before a retry"
    );
    describe_counter!(
        "tier_exhausted_total",
        Unit::Count,
        "Tiers given up after the retry policy ran out"
    );
    describe_counter!(
        "tier_escalations_total",
        Unit::Count,
        "Requests moved from one tier to the next"
    );
    describe_histogram!(
        "tier_cooldown_seconds",
        Unit::Seconds,
        "Fixed pauses applied around the costliest tier"
    );
    describe_counter!(
        "rate_limit_permits_acquired_total",
        Unit::Count,
        "Requests admitted by a tier rate limiter"
    );
    describe_gauge!(
        "rate_limit_permits_available",
        Unit::Count,
        "Free slots left in the current rate window"
    );
    describe_histogram!(
        "rate_limit_queue_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a rate window slot"
    );
    describe_counter!(
        "pages_committed_total",
        Unit::Count,
        "Pages persisted and checkpointed"
    );
    describe_counter!(
        "records_persisted_total",
        Unit::Count,
        "Listing records persisted, split by new or duplicate"
    );
    describe_counter!(
        "collections_completed_total",
        Unit::Count,
        "Collections that finished a run without error"
    );
    describe_counter!(
        "collections_failed_total",
        Unit::Count,
        "Collections that stopped on a failure"
    );

    *initialized = true;
    info!(addr = %addr, "Metrics system initialized");
    Ok(())
}

/// Check if the metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one request attempt on one tier
pub struct TierRequestMetrics {
    tier: TierKind,
    attempt: u32,
    start_time: Instant,
    correlation_id: String,
}

impl TierRequestMetrics {
    /// Start recording a request attempt
    pub fn start(tier: TierKind, attempt: u32) -> Self {
        let correlation_id = generate_correlation_id();
        debug!(
            correlation_id = %correlation_id,
            tier = %tier,
            attempt = attempt,
            "Starting request attempt"
        );
        Self {
            tier,
            attempt,
            start_time: Instant::now(),
            correlation_id,
        }
    }

    /// Record a completed response with its status code
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "tier_requests_total",
            "tier" => self.tier.as_str(),
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!("tier_request_duration_seconds", "tier" => self.tier.as_str())
            .record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                correlation_id = %self.correlation_id,
                tier = %self.tier,
                attempt = self.attempt,
                "Rate limit error (429) recorded"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            tier = %self.tier,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "Request attempt completed"
        );
    }

    /// Record an attempt that produced no response
    pub fn record_transport_error(&self, kind: &'static str) {
        let duration = self.start_time.elapsed();

        counter!(
            "tier_requests_total",
            "tier" => self.tier.as_str(),
            "status" => kind,
        )
        .increment(1);
        histogram!("tier_request_duration_seconds", "tier" => self.tier.as_str())
            .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            tier = %self.tier,
            error_kind = kind,
            duration_ms = duration.as_millis() as u64,
            "Request attempt failed without response"
        );
    }

    /// Correlation ID of this attempt
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a retry scheduled within a tier
pub fn record_retry_backoff(tier: TierKind, duration: Duration, attempt: u32) {
    counter!("tier_retries_total", "tier" => tier.as_str()).increment(1);
    histogram!(
        "retry_backoff_duration_seconds",
        "attempt" => attempt.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a tier whose retry policy ran out
pub fn record_tier_exhausted(tier: TierKind) {
    counter!("tier_exhausted_total", "tier" => tier.as_str()).increment(1);
}

/// Record a request moving to the next tier
pub fn record_escalation(from: TierKind, to: TierKind) {
    counter!(
        "tier_escalations_total",
        "from" => from.as_str(),
        "to" => to.as_str(),
    )
    .increment(1);
}

/// Record a cooldown pause (`kind` is "pre_escalation" or "post_success")
pub fn record_cooldown(kind: &'static str, duration: Duration) {
    histogram!("tier_cooldown_seconds", "kind" => kind).record(duration.as_secs_f64());
}

/// Rate limiter metrics helper
pub struct RateLimiterMetrics {
    tier: String,
    start_time: Option<Instant>,
}

impl RateLimiterMetrics {
    /// Create metrics for the limiter with the given label
    pub fn new(tier: impl Into<String>) -> Self {
        Self {
            tier: tier.into(),
            start_time: None,
        }
    }

    /// Start measuring queue wait time
    pub fn start_acquire(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Record an admission
    pub fn record_acquired(&mut self) {
        if let Some(start) = self.start_time.take() {
            let wait_duration = start.elapsed();

            histogram!("rate_limit_queue_wait_seconds", "tier" => self.tier.clone())
                .record(wait_duration.as_secs_f64());
            counter!("rate_limit_permits_acquired_total", "tier" => self.tier.clone())
                .increment(1);

            if wait_duration.as_millis() > 100 {
                debug!(
                    tier = %self.tier,
                    wait_ms = wait_duration.as_millis() as u64,
                    "Rate limit slot acquired after wait"
                );
            }
        }
    }

    /// Update the free-slot gauge
    pub fn update_available_permits(&self, available: usize) {
        gauge!("rate_limit_permits_available", "tier" => self.tier.clone()).set(available as f64);
    }
}

/// Per-collection run metrics
pub struct CollectionMetrics {
    collection_id: u64,
    start_time: Instant,
}

impl CollectionMetrics {
    /// Start tracking a collection run
    pub fn start(collection_id: u64) -> Self {
        Self {
            collection_id,
            start_time: Instant::now(),
        }
    }

    /// Record one committed page and its record counts
    pub fn record_page(&self, new_records: u64, duplicate_records: u64) {
        let collection = self.collection_id.to_string();
        counter!("pages_committed_total", "collection" => collection.clone()).increment(1);
        counter!(
            "records_persisted_total",
            "collection" => collection.clone(),
            "kind" => "new",
        )
        .increment(new_records);
        counter!(
            "records_persisted_total",
            "collection" => collection,
            "kind" => "duplicate",
        )
        .increment(duplicate_records);
    }

    /// Record a run that ended without error
    pub fn record_success(&self, pages: u32) {
        counter!(
            "collections_completed_total",
            "collection" => self.collection_id.to_string(),
        )
        .increment(1);
        debug!(
            collection_id = self.collection_id,
            pages = pages,
            duration_secs = self.start_time.elapsed().as_secs(),
            "Collection run metrics recorded"
        );
    }

    /// Record a run that stopped on a failure
    pub fn record_failure(&self, reason: &'static str) {
        counter!(
            "collections_failed_total",
            "collection" => self.collection_id.to_string(),
            "reason" => reason,
        )
        .increment(1);
    }
}
