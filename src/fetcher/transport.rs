//! HTTP transport per tier
//!
//! One `reqwest` client is built per tier so proxy routing and connection pools
//! never mix between tiers.

use crate::downloader::config::HttpConfig;
use crate::fetcher::tier::{Tier, TierEndpoint, TierKind};
use crate::fetcher::{FetchError, FetchResult, TransportError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use tracing::debug;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Response to a single attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Body text (empty for non-2xx responses)
    pub body: String,
}

impl TransportResponse {
    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs one GET attempt through a given tier
#[async_trait]
pub trait TierTransport: Send + Sync {
    /// Issue one request for `url` through `tier`
    async fn get(&self, tier: &Tier, url: &str) -> Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport with one client per tier
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    clients: HashMap<TierKind, Client>,
}

impl ReqwestTransport {
    /// Build a client for every tier in `tiers`
    ///
    /// # Errors
    /// Returns [`FetchError::ClientSetup`] if a proxy URL is rejected or TLS
    /// initialisation fails.
    pub fn new(tiers: &[Tier], http: &HttpConfig) -> FetchResult<Self> {
        let mut clients = HashMap::with_capacity(tiers.len());
        for tier in tiers {
            clients.insert(tier.kind(), build_client(tier.endpoint(), http)?);
        }
        Ok(Self { clients })
    }
}

fn build_client(endpoint: &TierEndpoint, http: &HttpConfig) -> FetchResult<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    let mut builder = Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .connect_timeout(http.connect_timeout)
        .timeout(http.request_timeout);

    if let TierEndpoint::Proxy(url) = endpoint {
        let proxy = Proxy::all(url.as_str())
            .map_err(|e| FetchError::ClientSetup(format!("proxy {endpoint}: {e}")))?;
        builder = builder.proxy(proxy);
    } else {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|e| FetchError::ClientSetup(e.to_string()))
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_body() || err.is_decode() {
        TransportError::Body(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl TierTransport for ReqwestTransport {
    async fn get(&self, tier: &Tier, url: &str) -> Result<TransportResponse, TransportError> {
        let client = self.clients.get(&tier.kind()).ok_or_else(|| {
            TransportError::InvalidRequest(format!("no client for {} tier", tier.kind()))
        })?;

        let response = client.get(url).send().await.map_err(classify)?;
        let status = response.status().as_u16();
        debug!(tier = %tier.kind(), url = %url, status, "Response received");

        if !response.status().is_success() {
            return Ok(TransportResponse {
                status,
                body: String::new(),
            });
        }

        let body = response.text().await.map_err(classify)?;
        Ok(TransportResponse { status, body })
    }
}
