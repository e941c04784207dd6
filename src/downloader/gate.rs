//! Concurrency gate
//!
//! Bounds how many page fetches are in flight at once, independently of the
//! per-tier rate limits.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate shared by cloning
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Slot held while a fetch is in flight; released on drop
#[derive(Debug)]
pub struct GatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConcurrencyGate {
    /// Gate admitting `capacity` holders at once (at least 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Maximum concurrent holders
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a slot
    pub async fn enter(&self) -> GatePermit {
        // The semaphore is private and never closed, so acquiring cannot fail
        let permit = self.semaphore.clone().acquire_owned().await.ok();
        GatePermit { _permit: permit }
    }
}
