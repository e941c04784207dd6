//! Crawl configuration constants and policy structs

use std::time::Duration;

/// Attempts per tier before the tier is considered exhausted.
/// 3 attempts absorb short connection drops without stalling escalation for long.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 2_000; // 2 seconds

/// Multiplier applied to the delay after every failed attempt.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Maximum backoff delay in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000; // 30 seconds

/// HTTP statuses treated as transient and retried within a tier.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

/// Requests admitted per tier within one rate window.
pub const DEFAULT_RATE_CAPACITY: usize = 100;

/// Length of the sliding rate window in seconds.
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;

/// Page fetches launched together in one batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Per-attempt request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// TCP connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Pause before a request escalates onto the costliest tier.
pub const DEFAULT_PRE_ESCALATION_COOLDOWN_SECS: u64 = 20;

/// Pause after the costliest tier served a request.
pub const DEFAULT_POST_SUCCESS_COOLDOWN_SECS: u64 = 5;

/// Pause between collections that produced any records.
pub const DEFAULT_INTER_COLLECTION_PAUSE_SECS: u64 = 15;

/// Calculate exponential backoff delay: `base * multiplier^retry`, clamped to `max`
pub fn calculate_backoff(base: Duration, multiplier: f64, max: Duration, retry: u32) -> Duration {
    let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
    let delay_ms = base.as_millis() as f64 * multiplier.powi(exponent);
    let max_ms = max.as_millis() as f64;

    if !delay_ms.is_finite() || delay_ms >= max_ms {
        return max;
    }
    if delay_ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_millis(delay_ms as u64)
}

/// Retry policy parameters for attempts within a single tier
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per tier (at least 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Growth factor between consecutive retries
    pub multiplier: f64,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// HTTP statuses that are retried instead of escalated immediately
    pub retryable_statuses: Vec<u16>,
}

impl RetryConfig {
    /// Delay before retry number `retry` (0-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        calculate_backoff(self.base_delay, self.multiplier, self.max_delay, retry)
    }

    /// Whether a non-success status should be retried within the tier
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Same policy with every delay set to zero
    pub fn without_delays(mut self) -> Self {
        self.base_delay = Duration::ZERO;
        self.max_delay = Duration::ZERO;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

/// Fixed pauses around the costliest tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownConfig {
    /// Applied before escalating onto the costliest tier
    pub pre_escalation: Duration,
    /// Applied after the costliest tier served a request
    pub post_success: Duration,
}

impl CooldownConfig {
    /// No cooldowns at all
    pub fn disabled() -> Self {
        Self {
            pre_escalation: Duration::ZERO,
            post_success: Duration::ZERO,
        }
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            pre_escalation: Duration::from_secs(DEFAULT_PRE_ESCALATION_COOLDOWN_SECS),
            post_success: Duration::from_secs(DEFAULT_POST_SUCCESS_COOLDOWN_SECS),
        }
    }
}

/// HTTP client timeouts applied to every tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    /// Overall per-attempt timeout
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}
