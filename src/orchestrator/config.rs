//! Fetch configuration constants

use std::time::Duration;

use crate::fetcher::retry::{RetryOn, RetryPolicy};

/// Requests the upstream API accepts per second; also the wave size.
pub const DEFAULT_LIMIT: usize = 5;

/// Upper bound accepted for `--concurrency`
pub const MAX_CONCURRENCY: usize = 32;

/// Pause after every successful call, on top of the concurrency bound.
/// Slightly over one second so a full wave never lands inside a single second.
pub const PACING_MS: u64 = 1100;

/// Per-call timeout inside a wave (seconds). Stragglers past it are dropped.
pub const PER_CALL_TIMEOUT_SECS: u64 = 60;

/// Wave layer: attempts per wave
pub const WAVE_RETRY_ATTEMPTS: u32 = 5;

/// Wave layer: delay between attempts (seconds)
pub const WAVE_RETRY_DELAY_SECS: u64 = 100;

/// Cycle layer: attempts per fetch cycle
pub const CYCLE_RETRY_ATTEMPTS: u32 = 3;

/// Cycle layer: delay between attempts (seconds). Long enough to ride out an upstream outage.
pub const CYCLE_RETRY_DELAY_SECS: u64 = 600;

/// Upper bound on waves in one sweep (10 000 pages at the default limit)
pub const MAX_WAVES: usize = 2_000;

/// HTTP connect timeout (seconds)
pub const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// HTTP request timeout (seconds) - large reference pages are slow to render upstream
pub const HTTP_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Retry and timeout tunables for one [`RequestOrchestrator`](super::RequestOrchestrator)
///
/// The wave size comes from the orchestrator's [`RateLimiter`](super::RateLimiter) and the
/// per-call pacing from the transport.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    per_call_timeout: Duration,
    wave_retry: RetryPolicy,
    cycle_retry: RetryPolicy,
    max_waves: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            per_call_timeout: Duration::from_secs(PER_CALL_TIMEOUT_SECS),
            wave_retry: RetryPolicy::wave_default(),
            cycle_retry: RetryPolicy::cycle_default(),
            max_waves: MAX_WAVES,
        }
    }
}

impl FetchConfig {
    /// Set the per-call timeout
    pub fn with_per_call_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = timeout;
        self
    }

    /// Set the wave retry layer (transient errors only)
    pub fn with_wave_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.wave_retry = RetryPolicy::new("wave", attempts, delay, RetryOn::Transient);
        self
    }

    /// Set the cycle retry layer (any recoverable error)
    pub fn with_cycle_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.cycle_retry = RetryPolicy::new("cycle", attempts, delay, RetryOn::Recoverable);
        self
    }

    /// Set the sweep wave bound
    pub fn with_max_waves(mut self, max_waves: usize) -> Self {
        self.max_waves = max_waves.max(1);
        self
    }

    /// Per-call timeout
    pub fn per_call_timeout(&self) -> Duration {
        self.per_call_timeout
    }

    /// Wave retry layer
    pub fn wave_retry(&self) -> &RetryPolicy {
        &self.wave_retry
    }

    /// Cycle retry layer
    pub fn cycle_retry(&self) -> &RetryPolicy {
        &self.cycle_retry
    }

    /// Sweep wave bound
    pub fn max_waves(&self) -> usize {
        self.max_waves
    }
}
