//! Integration tests for bounded retries within one tier

use catalogue_crawler::downloader::config::RetryConfig;
use catalogue_crawler::fetcher::retry::{AttemptFailure, RetryEvent, RetryObserver, RetryPolicy};
use catalogue_crawler::fetcher::tier::TierKind;
use catalogue_crawler::fetcher::transport::TransportResponse;
use catalogue_crawler::fetcher::TransportError;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const URL: &str = "https://catalogue.example/search?page=1";

#[derive(Default)]
struct Recorder {
    retries: Mutex<Vec<(u32, Duration, String)>>,
    give_ups: Mutex<Vec<(u32, String)>>,
}

impl RetryObserver for Recorder {
    fn on_retry(&self, event: &RetryEvent<'_>) {
        self.retries.lock().unwrap().push((
            event.attempt,
            event.wait,
            event.failure.summary(),
        ));
    }

    fn on_give_up(&self, event: &RetryEvent<'_>) {
        self.give_ups
            .lock()
            .unwrap()
            .push((event.attempt, event.failure.summary()));
    }
}

fn policy(recorder: &Arc<Recorder>) -> RetryPolicy {
    RetryPolicy::new(RetryConfig::default()).with_observer(recorder.clone())
}

fn response(status: u16) -> Result<TransportResponse, TransportError> {
    Ok(TransportResponse {
        status,
        body: if status == 200 { "ok".to_string() } else { String::new() },
    })
}

#[tokio::test(start_paused = true)]
async fn test_transient_status_retried_with_backoff() {
    let recorder = Arc::new(Recorder::default());
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let result = policy(&recorder)
        .run(TierKind::Datacenter, URL, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    response(503)
                } else {
                    response(200)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(result.body, "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 2s then 4s
    assert_eq!(start.elapsed(), Duration::from_secs(6));

    let retries = recorder.retries.lock().unwrap();
    assert_eq!(retries.len(), 2);
    assert_eq!(retries[0].0, 1);
    assert_eq!(retries[0].1, Duration::from_secs(2));
    assert_eq!(retries[1].1, Duration::from_secs(4));
    assert!(retries[0].2.contains("503"));
    assert!(recorder.give_ups.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_returns_last_failure() {
    let recorder = Arc::new(Recorder::default());
    let calls = AtomicU32::new(0);

    let failure = policy(&recorder)
        .run(TierKind::Residential, URL, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TransportError::Timeout("operation timed out".to_string())) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(matches!(failure, AttemptFailure::Transport(TransportError::Timeout(_))));
    let give_ups = recorder.give_ups.lock().unwrap();
    assert_eq!(give_ups.len(), 1);
    assert_eq!(give_ups[0].0, 3);
}

#[tokio::test]
async fn test_non_transient_status_not_retried() {
    let recorder = Arc::new(Recorder::default());
    let calls = AtomicU32::new(0);

    let failure = policy(&recorder)
        .run(TierKind::Direct, URL, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { response(403) }
        })
        .await
        .unwrap_err();

    assert_eq!(failure, AttemptFailure::Status(403));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(recorder.retries.lock().unwrap().is_empty());
    assert!(recorder.give_ups.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_request_not_retried() {
    let recorder = Arc::new(Recorder::default());
    let calls = AtomicU32::new(0);

    let failure = policy(&recorder)
        .run(TierKind::Direct, "not a url", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TransportError::InvalidRequest("relative URL without a base".to_string())) }
        })
        .await
        .unwrap_err();

    assert!(matches!(
        failure,
        AttemptFailure::Transport(TransportError::InvalidRequest(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_clamped() {
    let recorder = Arc::new(Recorder::default());
    let config = RetryConfig {
        max_attempts: 6,
        ..RetryConfig::default()
    };

    let _ = RetryPolicy::new(config)
        .with_observer(recorder.clone())
        .run(TierKind::Unlocker, URL, || async { response(429) })
        .await;

    let waits: Vec<Duration> = recorder
        .retries
        .lock()
        .unwrap()
        .iter()
        .map(|(_, wait, _)| *wait)
        .collect();
    assert_eq!(
        waits,
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
            Duration::from_secs(16),
            Duration::from_secs(30),
        ]
    );
}
