//! Network tiers
//!
//! A tier is one way of reaching the catalogue (direct or through a proxy class),
//! with its own rate limiter. Tiers are ordered cheapest first.

use crate::downloader::config::{DEFAULT_RATE_CAPACITY, DEFAULT_RATE_WINDOW_SECS};
use crate::downloader::rate_limit::RateLimiter;
use crate::fetcher::FetchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Class of network route, ordered from cheapest to costliest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierKind {
    /// No proxy
    Direct,
    /// Datacenter proxy pool
    Datacenter,
    /// Residential proxy pool
    Residential,
    /// Web unlocker endpoint
    Unlocker,
}

impl TierKind {
    /// All kinds in escalation order
    pub const ALL: [TierKind; 4] = [
        TierKind::Direct,
        TierKind::Datacenter,
        TierKind::Residential,
        TierKind::Unlocker,
    ];

    /// Stable lowercase name used in logs, metrics and the CLI
    pub fn as_str(&self) -> &'static str {
        match self {
            TierKind::Direct => "direct",
            TierKind::Datacenter => "datacenter",
            TierKind::Residential => "residential",
            TierKind::Unlocker => "unlocker",
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierKind {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "none" => Ok(TierKind::Direct),
            "datacenter" => Ok(TierKind::Datacenter),
            "residential" => Ok(TierKind::Residential),
            "unlocker" => Ok(TierKind::Unlocker),
            other => Err(FetchError::InvalidTier(other.to_string())),
        }
    }
}

/// Where a tier's requests are sent through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierEndpoint {
    /// Straight to the origin
    Direct,
    /// Through the proxy at this URL (may embed credentials)
    Proxy(Url),
}

impl fmt::Display for TierEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierEndpoint::Direct => f.write_str("direct"),
            TierEndpoint::Proxy(url) => {
                let host = url.host_str().unwrap_or("?");
                match url.port() {
                    Some(port) => write!(f, "{}://{host}:{port}", url.scheme()),
                    None => write!(f, "{}://{host}", url.scheme()),
                }
            }
        }
    }
}

/// A network tier with its own sliding-window limiter
#[derive(Debug)]
pub struct Tier {
    kind: TierKind,
    endpoint: TierEndpoint,
    limiter: RateLimiter,
}

impl Tier {
    /// Create a tier admitting `rate_capacity` requests per `window`
    pub fn new(kind: TierKind, endpoint: TierEndpoint, rate_capacity: usize, window: Duration) -> Self {
        Self {
            kind,
            endpoint,
            limiter: RateLimiter::new(rate_capacity, window).with_label(kind.as_str()),
        }
    }

    /// Tier class
    pub fn kind(&self) -> TierKind {
        self.kind
    }

    /// Route used by this tier
    pub fn endpoint(&self) -> &TierEndpoint {
        &self.endpoint
    }

    /// Limiter guarding this tier
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

/// Requests admitted per rate window, per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierRateLimits {
    /// Direct tier
    pub direct: usize,
    /// Datacenter proxy tier
    pub datacenter: usize,
    /// Residential proxy tier
    pub residential: usize,
    /// Web unlocker tier
    pub unlocker: usize,
}

impl TierRateLimits {
    /// Same capacity on every tier
    pub fn uniform(capacity: usize) -> Self {
        Self {
            direct: capacity,
            datacenter: capacity,
            residential: capacity,
            unlocker: capacity,
        }
    }

    /// Capacity of the `kind` tier
    pub fn for_kind(&self, kind: TierKind) -> usize {
        match kind {
            TierKind::Direct => self.direct,
            TierKind::Datacenter => self.datacenter,
            TierKind::Residential => self.residential,
            TierKind::Unlocker => self.unlocker,
        }
    }
}

impl Default for TierRateLimits {
    fn default() -> Self {
        Self::uniform(DEFAULT_RATE_CAPACITY)
    }
}

/// Settings from which the tier list is built
#[derive(Debug, Clone)]
pub struct TierSettings {
    /// Route through proxies; `false` yields a direct-only list
    pub use_proxy: bool,
    /// Datacenter proxy URL
    pub datacenter: Option<Url>,
    /// Residential proxy URL
    pub residential: Option<Url>,
    /// Web unlocker URL
    pub unlocker: Option<Url>,
    /// Requests per window on each tier
    pub rate_limits: TierRateLimits,
    /// Rate window length
    pub rate_window: Duration,
}

impl Default for TierSettings {
    fn default() -> Self {
        Self {
            use_proxy: false,
            datacenter: None,
            residential: None,
            unlocker: None,
            rate_limits: TierRateLimits::default(),
            rate_window: Duration::from_secs(DEFAULT_RATE_WINDOW_SECS),
        }
    }
}

/// Build the ordered tier list
///
/// Without proxies the list is a single direct tier. With proxies it holds
/// every configured proxy tier, cheapest first.
///
/// # Errors
/// Returns [`FetchError::NoTiers`] if proxies are enabled but none is configured.
pub fn build_tiers(settings: &TierSettings) -> Result<Vec<Tier>, FetchError> {
    let tier = |kind, endpoint| {
        Tier::new(
            kind,
            endpoint,
            settings.rate_limits.for_kind(kind),
            settings.rate_window,
        )
    };

    if !settings.use_proxy {
        return Ok(vec![tier(TierKind::Direct, TierEndpoint::Direct)]);
    }

    let tiers: Vec<Tier> = [
        (TierKind::Datacenter, &settings.datacenter),
        (TierKind::Residential, &settings.residential),
        (TierKind::Unlocker, &settings.unlocker),
    ]
    .into_iter()
    .filter_map(|(kind, url)| {
        url.as_ref()
            .map(|url| tier(kind, TierEndpoint::Proxy(url.clone())))
    })
    .collect();

    if tiers.is_empty() {
        return Err(FetchError::NoTiers);
    }
    Ok(tiers)
}
