//! Fixed-delay retry layers
//!
//! Two layers wrap a fetch cycle: a wave layer that absorbs transient network errors
//! and a cycle layer that restarts the whole sweep on anything recoverable. Fatal
//! errors pass through both untouched.

use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::fetcher::{FetchError, FetchResult};
use crate::metrics;
use crate::orchestrator::config::{
    CYCLE_RETRY_ATTEMPTS, CYCLE_RETRY_DELAY_SECS, WAVE_RETRY_ATTEMPTS, WAVE_RETRY_DELAY_SECS,
};

/// Which errors a layer retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// Connection failures and timeouts only
    Transient,
    /// Every error that is not fatal
    Recoverable,
}

impl RetryOn {
    /// Whether `err` is in this allow-list
    pub fn matches(&self, err: &FetchError) -> bool {
        match self {
            RetryOn::Transient => err.is_transient(),
            RetryOn::Recoverable => !err.is_fatal(),
        }
    }
}

/// Bounded, fixed-delay retry around an async operation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    layer: &'static str,
    max_attempts: u32,
    delay: Duration,
    retry_on: RetryOn,
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` below 1 is treated as 1
    pub fn new(layer: &'static str, max_attempts: u32, delay: Duration, retry_on: RetryOn) -> Self {
        Self {
            layer,
            max_attempts: max_attempts.max(1),
            delay,
            retry_on,
        }
    }

    /// Wave layer: 5 attempts, 100 s apart, transient errors only
    pub fn wave_default() -> Self {
        Self::new(
            "wave",
            WAVE_RETRY_ATTEMPTS,
            Duration::from_secs(WAVE_RETRY_DELAY_SECS),
            RetryOn::Transient,
        )
    }

    /// Cycle layer: 3 attempts, 600 s apart, any recoverable error
    pub fn cycle_default() -> Self {
        Self::new(
            "cycle",
            CYCLE_RETRY_ATTEMPTS,
            Duration::from_secs(CYCLE_RETRY_DELAY_SECS),
            RetryOn::Recoverable,
        )
    }

    /// Maximum number of attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay between attempts
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Whether this layer would retry `err`
    pub fn retries(&self, err: &FetchError) -> bool {
        self.retry_on.matches(err)
    }

    /// Run `op` until it succeeds, fails with an error outside the allow-list, or
    /// attempts run out
    ///
    /// `op` receives the 1-based attempt number. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, context: &str, mut op: F) -> FetchResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = FetchResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            layer = self.layer,
                            context,
                            attempt,
                            max_attempts = self.max_attempts,
                            "retry attempt succeeded"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !self.retry_on.matches(&e) => {
                    warn!(
                        layer = self.layer,
                        context,
                        attempt,
                        error = %e,
                        "error not retried by this layer"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let remaining = self.max_attempts - attempt;
                    warn!(
                        layer = self.layer,
                        context,
                        attempt,
                        remaining,
                        error = %e,
                        "attempt failed"
                    );
                    if remaining == 0 {
                        error!(
                            layer = self.layer,
                            context,
                            attempts = self.max_attempts,
                            error = %e,
                            "retries exhausted"
                        );
                        return Err(e);
                    }
                    metrics::record_retry(self.layer);
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
