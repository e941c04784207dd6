//! Integration tests for the reqwest transport against a mock catalogue

use catalogue_crawler::downloader::config::{CooldownConfig, HttpConfig, RetryConfig};
use catalogue_crawler::fetcher::retry::RetryPolicy;
use catalogue_crawler::fetcher::tier::{build_tiers, TierKind, TierSettings};
use catalogue_crawler::fetcher::waterfall::WaterfallClient;
use catalogue_crawler::fetcher::{FetchOutcome, TransportError};
use std::time::Duration;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn direct_client(max_attempts: u32, request_timeout: Duration) -> WaterfallClient {
    let tiers = build_tiers(&TierSettings::default()).unwrap();
    let http = HttpConfig {
        request_timeout,
        connect_timeout: Duration::from_secs(2),
    };
    let retry = RetryConfig {
        max_attempts,
        ..RetryConfig::default()
    }
    .without_delays();
    WaterfallClient::with_reqwest(tiers, &http, RetryPolicy::new(retry), CooldownConfig::disabled())
        .unwrap()
}

#[tokio::test]
async fn test_success_returns_body_and_tier() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", "3"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>page three</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/search?q=cardiology&page=3", server.uri());
    let outcome = direct_client(3, Duration::from_secs(5))
        .fetch_page(&url, None)
        .await;

    match outcome {
        FetchOutcome::Success { tier, page } => {
            assert_eq!(tier, TierKind::Direct);
            assert_eq!(page.status, 200);
            assert_eq!(page.body, "<html>page three</html>");
            assert_eq!(page.url, url);
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retryable_status_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let outcome = direct_client(2, Duration::from_secs(5))
        .fetch_page(&format!("{}/search", server.uri()), None)
        .await;

    assert_eq!(
        outcome,
        FetchOutcome::HttpError {
            tier: TierKind::Direct,
            status: 503
        }
    );
}

#[tokio::test]
async fn test_blocked_status_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = direct_client(3, Duration::from_secs(5))
        .fetch_page(&format!("{}/search", server.uri()), None)
        .await;

    assert!(matches!(outcome, FetchOutcome::HttpError { status: 403, .. }));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = direct_client(1, Duration::from_millis(200))
        .fetch_page(&format!("{}/search", server.uri()), None)
        .await;

    assert!(matches!(
        outcome,
        FetchOutcome::TransportError {
            tier: TierKind::Direct,
            error: TransportError::Timeout(_)
        }
    ));
}

#[tokio::test]
async fn test_recovers_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = direct_client(3, Duration::from_secs(5))
        .fetch_page(&format!("{}/search", server.uri()), None)
        .await;

    assert!(outcome.is_success());
}
