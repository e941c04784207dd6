//! Tier waterfall client
//!
//! Tries each tier in order, cheapest first. Within a tier the request is
//! throttled by the tier's limiter and retried by the [`RetryPolicy`]. A tier
//! that still fails hands the request to the next one. The costliest tier is
//! guarded by fixed cooldowns when the list has more than one tier.

use crate::downloader::config::{CooldownConfig, HttpConfig};
use crate::fetcher::retry::RetryPolicy;
use crate::fetcher::tier::{Tier, TierKind};
use crate::fetcher::transport::{ReqwestTransport, TierTransport};
use crate::fetcher::{FetchError, FetchOutcome, FetchResult, FetchedPage, PageFetcher, TransportError};
use crate::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Fetches pages through an ordered list of tiers
pub struct WaterfallClient {
    tiers: Vec<Tier>,
    transport: Arc<dyn TierTransport>,
    retry: RetryPolicy,
    cooldowns: CooldownConfig,
    start_index: usize,
}

impl WaterfallClient {
    /// Create a client over `tiers`
    ///
    /// # Errors
    /// - [`FetchError::NoTiers`] for an empty list
    /// - [`FetchError::TierOrder`] unless tiers are strictly ordered cheapest first
    pub fn new(
        tiers: Vec<Tier>,
        transport: Arc<dyn TierTransport>,
        retry: RetryPolicy,
        cooldowns: CooldownConfig,
    ) -> FetchResult<Self> {
        if tiers.is_empty() {
            return Err(FetchError::NoTiers);
        }
        for pair in tiers.windows(2) {
            if pair[0].kind() >= pair[1].kind() {
                return Err(FetchError::TierOrder(pair[1].kind(), pair[0].kind()));
            }
        }

        Ok(Self {
            tiers,
            transport,
            retry,
            cooldowns,
            start_index: 0,
        })
    }

    /// Create a client with one `reqwest` client per tier
    pub fn with_reqwest(
        tiers: Vec<Tier>,
        http: &HttpConfig,
        retry: RetryPolicy,
        cooldowns: CooldownConfig,
    ) -> FetchResult<Self> {
        let transport = ReqwestTransport::new(&tiers, http)?;
        Self::new(tiers, Arc::new(transport), retry, cooldowns)
    }

    /// Default starting tier for every request
    ///
    /// # Errors
    /// Returns [`FetchError::UnknownTier`] if `kind` is not in the tier list.
    pub fn with_start_tier(mut self, kind: TierKind) -> FetchResult<Self> {
        self.start_index = self
            .tiers
            .iter()
            .position(|tier| tier.kind() == kind)
            .ok_or(FetchError::UnknownTier(kind))?;
        Ok(self)
    }

    /// Configured tiers, cheapest first
    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Default starting tier
    pub fn start_tier(&self) -> TierKind {
        self.tiers[self.start_index].kind()
    }

    /// First tier at or above both the default start and `min_tier`
    ///
    /// A `min_tier` above every configured tier pins the costliest one.
    fn start_index_for(&self, min_tier: Option<TierKind>) -> usize {
        let Some(min_tier) = min_tier else {
            return self.start_index;
        };
        let pinned = self
            .tiers
            .iter()
            .position(|tier| tier.kind() >= min_tier)
            .unwrap_or(self.tiers.len() - 1);
        pinned.max(self.start_index)
    }

    fn is_costliest(&self, index: usize) -> bool {
        self.tiers.len() > 1 && index == self.tiers.len() - 1
    }

    async fn cooldown(&self, kind: &'static str, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        info!(
            cooldown = kind,
            wait_secs = duration.as_secs_f64(),
            "Cooling down around costliest tier"
        );
        metrics::record_cooldown(kind, duration);
        tokio::time::sleep(duration).await;
    }

    /// Fetch `url`, escalating through tiers until one succeeds
    pub async fn fetch_page(&self, url: &str, min_tier: Option<TierKind>) -> FetchOutcome {
        let last_index = self.tiers.len() - 1;

        for index in self.start_index_for(min_tier)..=last_index {
            let tier = &self.tiers[index];
            tier.limiter().acquire().await;
            debug!(tier = %tier.kind(), url = %url, "Fetching through tier");

            let result = self
                .retry
                .run(tier.kind(), url, || self.transport.get(tier, url))
                .await;

            match result {
                Ok(response) => {
                    if self.is_costliest(index) {
                        self.cooldown("post_success", self.cooldowns.post_success)
                            .await;
                    }
                    return FetchOutcome::Success {
                        tier: tier.kind(),
                        page: FetchedPage {
                            url: url.to_string(),
                            status: response.status,
                            body: response.body,
                        },
                    };
                }
                Err(failure) if index == last_index => {
                    error!(
                        tier = %tier.kind(),
                        url = %url,
                        reason = %failure.summary(),
                        "All tiers exhausted"
                    );
                    return failure.into_outcome(tier.kind());
                }
                Err(failure) => {
                    let next = &self.tiers[index + 1];
                    warn!(
                        tier = %tier.kind(),
                        next_tier = %next.kind(),
                        url = %url,
                        reason = %failure.summary(),
                        "Tier failed, escalating"
                    );
                    metrics::record_escalation(tier.kind(), next.kind());
                    if self.is_costliest(index + 1) {
                        self.cooldown("pre_escalation", self.cooldowns.pre_escalation)
                            .await;
                    }
                }
            }
        }

        // The loop always returns on its last iteration; an empty range means the
        // start index was out of bounds.
        FetchOutcome::TransportError {
            tier: self.tiers[last_index].kind(),
            error: TransportError::InvalidRequest("no tier attempted".to_string()),
        }
    }
}

#[async_trait]
impl PageFetcher for WaterfallClient {
    async fn fetch(&self, url: &str, min_tier: Option<TierKind>) -> FetchOutcome {
        self.fetch_page(url, min_tier).await
    }
}
