//! Bounded retries within a single tier
//!
//! [`RetryPolicy::run`] repeats a network operation while its failures are
//! transient, sleeping an exponentially growing delay between attempts. Every
//! scheduled retry and every give-up is reported to a [`RetryObserver`].

use crate::downloader::config::RetryConfig;
use crate::fetcher::tier::TierKind;
use crate::fetcher::transport::TransportResponse;
use crate::fetcher::TransportError;
use crate::fetcher::FetchOutcome;
use crate::metrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Classification of attempt failures for log messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Request or connect timeout
    NetworkTimeout,
    /// Connection refused, DNS failure
    NetworkOffline,
    /// Response body interrupted
    BodyInterrupted,
    /// HTTP 429
    RateLimit,
    /// HTTP 5xx
    ServerError(u16),
    /// HTTP 401/403, typically a block page
    Blocked(u16),
    /// Other HTTP 4xx
    ClientError(u16),
    /// Request could not be built
    InvalidRequest,
    /// Anything else
    NetworkGeneric,
}

impl RetryErrorType {
    /// Short human description
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::BodyInterrupted => "response body interrupted",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::Blocked(_) => "request blocked",
            Self::ClientError(code) => match code {
                404 => "page not found",
                408 => "request timeout",
                _ => "client error",
            },
            Self::InvalidRequest => "invalid request",
            Self::NetworkGeneric => "network error",
        }
    }
}

/// Why a single attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// A response arrived with a non-2xx status
    Status(u16),
    /// No response arrived
    Transport(TransportError),
}

impl AttemptFailure {
    /// Classify for logging
    pub fn error_type(&self) -> RetryErrorType {
        match self {
            AttemptFailure::Status(429) => RetryErrorType::RateLimit,
            AttemptFailure::Status(code @ (401 | 403)) => RetryErrorType::Blocked(*code),
            AttemptFailure::Status(code) if *code >= 500 => RetryErrorType::ServerError(*code),
            AttemptFailure::Status(code) => RetryErrorType::ClientError(*code),
            AttemptFailure::Transport(TransportError::Timeout(_)) => RetryErrorType::NetworkTimeout,
            AttemptFailure::Transport(TransportError::Connect(_)) => RetryErrorType::NetworkOffline,
            AttemptFailure::Transport(TransportError::Body(_)) => RetryErrorType::BodyInterrupted,
            AttemptFailure::Transport(TransportError::InvalidRequest(_)) => {
                RetryErrorType::InvalidRequest
            }
            AttemptFailure::Transport(TransportError::Other(_)) => RetryErrorType::NetworkGeneric,
        }
    }

    /// One-line summary including the status or error text
    pub fn summary(&self) -> String {
        match self {
            AttemptFailure::Status(code) => {
                format!("HTTP {code} ({})", self.error_type().description())
            }
            AttemptFailure::Transport(err) => err.to_string(),
        }
    }

    /// Terminal outcome when this failure ends the waterfall on `tier`
    pub fn into_outcome(self, tier: TierKind) -> FetchOutcome {
        match self {
            AttemptFailure::Status(status) => FetchOutcome::HttpError { tier, status },
            AttemptFailure::Transport(error) => FetchOutcome::TransportError { tier, error },
        }
    }
}

/// A retry that is about to sleep, or a give-up
#[derive(Debug, Clone)]
pub struct RetryEvent<'a> {
    /// Tier being retried
    pub tier: TierKind,
    /// Requested URL
    pub url: &'a str,
    /// Attempt that just failed (1-based)
    pub attempt: u32,
    /// Attempts allowed on this tier
    pub max_attempts: u32,
    /// Delay before the next attempt (zero on give-up)
    pub wait: Duration,
    /// The failure
    pub failure: &'a AttemptFailure,
}

impl RetryEvent<'_> {
    /// Standard retry log line
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({} tier)",
            self.attempt,
            self.max_attempts,
            self.failure.error_type().description(),
            self.wait.as_secs_f64(),
            self.tier
        )
    }

    /// Standard give-up log line
    pub fn format_give_up(&self) -> String {
        format!(
            "[FAILED] {} tier gave up after {} attempts: {}",
            self.tier,
            self.attempt,
            self.failure.summary()
        )
    }
}

/// Receives retry and give-up notifications
pub trait RetryObserver: Send + Sync {
    /// A retry was scheduled
    fn on_retry(&self, event: &RetryEvent<'_>);
    /// The policy gave up on a tier
    fn on_give_up(&self, event: &RetryEvent<'_>);
}

/// Observer writing to `tracing` and the metrics facade
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRetryObserver;

impl RetryObserver for TracingRetryObserver {
    fn on_retry(&self, event: &RetryEvent<'_>) {
        warn!(
            tier = %event.tier,
            url = %event.url,
            attempt = event.attempt,
            max_attempts = event.max_attempts,
            wait_ms = event.wait.as_millis() as u64,
            reason = %event.failure.summary(),
            "{}",
            event.format_retry()
        );
        metrics::record_retry_backoff(event.tier, event.wait, event.attempt);
    }

    fn on_give_up(&self, event: &RetryEvent<'_>) {
        error!(
            tier = %event.tier,
            url = %event.url,
            attempts = event.attempt,
            reason = %event.failure.summary(),
            "{}",
            event.format_give_up()
        );
        metrics::record_tier_exhausted(event.tier);
    }
}

/// Retry policy for one tier
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    observer: Arc<dyn RetryObserver>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Create a policy that logs through `tracing`
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            observer: Arc::new(TracingRetryObserver),
        }
    }

    /// Replace the observer
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Policy parameters
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether a failure should be retried on the same tier
    pub fn is_transient(&self, failure: &AttemptFailure) -> bool {
        match failure {
            AttemptFailure::Status(status) => self.config.is_retryable_status(*status),
            AttemptFailure::Transport(err) => err.is_transient(),
        }
    }

    /// Run `operation` until it yields a 2xx response or the policy gives up
    ///
    /// Non-transient failures return immediately without a retry. Transient
    /// failures are retried up to `max_attempts` total attempts; the last
    /// failure is returned once they run out.
    pub async fn run<F, Fut>(
        &self,
        tier: TierKind,
        url: &str,
        mut operation: F,
    ) -> Result<TransportResponse, AttemptFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<TransportResponse, TransportError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let request_metrics = metrics::TierRequestMetrics::start(tier, attempt);
            let failure = match operation().await {
                Ok(response) if response.is_success() => {
                    request_metrics.record_complete(response.status);
                    if attempt > 1 {
                        debug!(tier = %tier, url = %url, attempt, "Retry attempt succeeded");
                    }
                    return Ok(response);
                }
                Ok(response) => {
                    request_metrics.record_complete(response.status);
                    AttemptFailure::Status(response.status)
                }
                Err(err) => {
                    request_metrics.record_transport_error(err.kind());
                    AttemptFailure::Transport(err)
                }
            };

            if !self.is_transient(&failure) {
                debug!(
                    tier = %tier,
                    url = %url,
                    attempt,
                    reason = %failure.summary(),
                    "Non-transient failure, not retrying"
                );
                return Err(failure);
            }

            if attempt >= max_attempts {
                self.observer.on_give_up(&RetryEvent {
                    tier,
                    url,
                    attempt,
                    max_attempts,
                    wait: Duration::ZERO,
                    failure: &failure,
                });
                return Err(failure);
            }

            let wait = self.config.backoff(attempt - 1);
            self.observer.on_retry(&RetryEvent {
                tier,
                url,
                attempt,
                max_attempts,
                wait,
                failure: &failure,
            });
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }
}
