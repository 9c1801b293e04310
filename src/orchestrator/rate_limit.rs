//! Concurrency-bounded rate limiting
//!
//! At most `limit` requests may be outstanding at once. A slot is held by a
//! [`RateLimitPermit`] and released when the permit drops, including when the request
//! errors or its future is cancelled.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::metrics;

/// Bounds the number of in-flight requests
#[derive(Debug, Clone)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// One in-flight slot; dropping it frees the slot
#[derive(Debug)]
pub struct RateLimitPermit {
    _permit: OwnedSemaphorePermit,
}

impl RateLimitPermit {
    /// Free the slot now
    pub fn release(self) {}
}

impl RateLimiter {
    /// Create a limiter with `limit` slots (at least one)
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Total number of slots
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held
    pub fn in_flight(&self) -> usize {
        self.limit - self.available()
    }

    /// Wait for a free slot
    ///
    /// Waiters are served in FIFO order, so no caller starves under bounded load.
    pub async fn acquire(&self) -> Result<RateLimitPermit, RateLimitError> {
        let started = Instant::now();
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        metrics::record_permit_acquired(started.elapsed(), self.available());
        Ok(RateLimitPermit { _permit: permit })
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire a permit
    #[error("failed to acquire rate limit permit: {0}")]
    AcquireError(String),
}
