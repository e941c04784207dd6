//! Sliding-window rate limiting
//!
//! Admits at most `capacity` requests within any trailing `window`. Callers that
//! would exceed the quota sleep until the oldest admission leaves the window.

use crate::metrics::RateLimiterMetrics;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Sliding-window request limiter owned by a single tier
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    label: String,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `capacity` requests per `window`
    ///
    /// # Arguments
    /// * `capacity` - Maximum requests per window (values below 1 are raised to 1)
    /// * `window` - Length of the trailing window
    pub fn new(capacity: usize, window: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            window,
            label: "default".to_string(),
            admitted: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Attach a label used in logs and metrics (normally the tier name)
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Maximum requests per window
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of admissions still inside the trailing window
    pub fn in_window(&self) -> usize {
        let mut admitted = self.lock();
        Self::purge(&mut admitted, Instant::now(), self.window);
        admitted.len()
    }

    /// Wait for a free slot, then record this call's admission
    ///
    /// The purge + admit-or-compute-wait step runs under a short lock; the sleep
    /// happens with the lock released so other callers keep making progress.
    pub async fn acquire(&self) {
        let mut metrics = RateLimiterMetrics::new(&self.label);
        metrics.start_acquire();

        loop {
            let wait = {
                let mut admitted = self.lock();
                let now = Instant::now();
                Self::purge(&mut admitted, now, self.window);

                if admitted.len() < self.capacity {
                    admitted.push_back(now);
                    let available = self.capacity - admitted.len();
                    drop(admitted);
                    metrics.record_acquired();
                    metrics.update_available_permits(available);
                    return;
                }

                admitted
                    .front()
                    .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                    .unwrap_or_default()
            };

            debug!(
                limiter = %self.label,
                capacity = self.capacity,
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, waiting for a slot"
            );
            sleep(wait).await;
        }
    }

    fn purge(admitted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = admitted.front() {
            if now.saturating_duration_since(*oldest) >= window {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.admitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
