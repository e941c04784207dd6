//! Page fetching through the tier waterfall

use crate::fetcher::tier::TierKind;
use async_trait::async_trait;

pub mod listing_parser;
pub mod retry;
pub mod tier;
pub mod transport;
pub mod waterfall;

/// Errors raised while configuring or using the fetch layer
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Empty tier list
    #[error("no network tiers configured")]
    NoTiers,

    /// Tiers not strictly ordered cheapest first
    #[error("tiers must be ordered cheapest first: {0} after {1}")]
    TierOrder(TierKind, TierKind),

    /// Start tier missing from the tier list
    #[error("start tier {0} is not configured")]
    UnknownTier(TierKind),

    /// Tier name could not be parsed
    #[error("invalid tier name: {0}")]
    InvalidTier(String),

    /// HTTP client could not be built
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),
}

/// Result type for fetch configuration
pub type FetchResult<T> = Result<T, FetchError>;

/// Attempt-level failure that produced no HTTP response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Request or connect timeout
    #[error("timeout: {0}")]
    Timeout(String),

    /// Connection refused, reset or DNS failure
    #[error("connection failed: {0}")]
    Connect(String),

    /// Response body could not be read
    #[error("body read failed: {0}")]
    Body(String),

    /// Request could not be built (bad URL, bad proxy); retrying cannot help
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Any other network failure
    #[error("network error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether another attempt on the same tier may succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            TransportError::Connect(_) => "connect",
            TransportError::Body(_) => "body",
            TransportError::InvalidRequest(_) => "invalid_request",
            TransportError::Other(_) => "network",
        }
    }
}

/// Successful page response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Requested URL
    pub url: String,
    /// 2xx status
    pub status: u16,
    /// Response body
    pub body: String,
}

/// Result of one waterfall fetch
///
/// Failures are values: callers decide whether a failed page stops their run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Page served by `tier`
    Success {
        /// Tier that served the page
        tier: TierKind,
        /// The page
        page: FetchedPage,
    },
    /// Every tier exhausted; the last one answered with `status`
    HttpError {
        /// Last tier tried
        tier: TierKind,
        /// Its final status
        status: u16,
    },
    /// Every tier exhausted; the last one failed without a response
    TransportError {
        /// Last tier tried
        tier: TierKind,
        /// Its final error
        error: TransportError,
    },
}

impl FetchOutcome {
    /// Tier that produced this outcome
    pub fn tier(&self) -> TierKind {
        match self {
            FetchOutcome::Success { tier, .. }
            | FetchOutcome::HttpError { tier, .. }
            | FetchOutcome::TransportError { tier, .. } => *tier,
        }
    }

    /// Whether the page was fetched
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success { .. })
    }
}

/// Anything that can fetch one page URL
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`, starting no cheaper than `min_tier` when given
    async fn fetch(&self, url: &str, min_tier: Option<TierKind>) -> FetchOutcome;
}
