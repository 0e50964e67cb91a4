//! Per-host concurrency limiter
//!
//! Bounds simultaneous downloads against a single remote host independently of the
//! global bound, so one image host is never hammered by the whole worker pool.

use crate::url::host_of;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Map of lazily-created per-host semaphores
///
/// Gates are created on first use and kept for the life of the limiter; the set of
/// image hosts seen in one crawl is small.
pub struct HostLimiter {
    gates: DashMap<String, Arc<Semaphore>>,
    per_host: usize,
}

impl HostLimiter {
    /// Creates a limiter allowing `per_host` concurrent holders per hostname
    #[must_use]
    pub fn new(per_host: usize) -> Self {
        Self {
            gates: DashMap::new(),
            per_host,
        }
    }

    /// Waits for a slot on the host of `url`
    ///
    /// The slot is released when the returned permit is dropped. URLs without a
    /// resolvable host share one default bucket. Only the calling task is suspended.
    pub async fn acquire(&self, url: &str) -> Result<OwnedSemaphorePermit, AcquireError> {
        let host = host_of(url);
        let gate = self
            .gates
            .entry(host)
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host)))
            .clone();

        gate.acquire_owned().await
    }

    /// Number of hosts that have a gate
    pub fn host_count(&self) -> usize {
        self.gates.len()
    }

    /// Per-host capacity
    pub fn per_host(&self) -> usize {
        self.per_host
    }
}
