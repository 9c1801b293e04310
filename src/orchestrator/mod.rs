//! Request orchestration
//!
//! The [`RequestOrchestrator`] drives one endpoint's complete fetch cycle:
//!
//! 1. **Token**: obtain (or reuse) the bearer token from the [`TokenManager`]
//! 2. **Batches**: ask [`pagination::batches`](crate::fetcher::pagination::batches) for the next wave
//! 3. **Dispatch**: send every payload of the wave concurrently, one [`RateLimiter`] slot each
//! 4. **Aggregate**: append the wave's rows once all calls have settled
//! 5. **Terminate**: sweeps stop after a zero-row wave or a wave holding a page past the end
//!    (a 2xx answer with no rows); finite kinds stop when batches run out
//!
//! # Error Handling
//!
//! - A call that times out contributes no rows; the wave continues
//! - A call that errors fails the whole wave; the wave layer retries transient errors
//! - A wave that still fails aborts the cycle; the cycle layer restarts it from scratch
//! - Fatal errors (auth, empty id set, runaway pagination) are never retried
//!
//! # Components
//!
//! - [`config`] - constants and [`FetchConfig`]
//! - [`rate_limit`] - in-flight request bound

pub mod config;
pub mod rate_limit;

pub use config::FetchConfig;
pub use rate_limit::{RateLimitError, RateLimitPermit, RateLimiter};

use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::descriptor::{EntityId, Payload, RequestDescriptor, Row};
use crate::fetcher::pagination;
use crate::fetcher::token::{Token, TokenManager};
use crate::fetcher::{FetchError, FetchResult, PostOutcome, Transport};
use crate::metrics;

/// HTTP status that makes the orchestrator drop its cached token
const UNAUTHORIZED: u16 = 401;

/// Rows of one call; `exhausted` marks a 2xx answer with no rows
struct CallRows {
    rows: Vec<Row>,
    exhausted: bool,
}

/// Aggregated rows of one wave
struct WaveRows {
    rows: Vec<Row>,
    exhausted_pages: usize,
}

/// Drives fetch cycles against one transport
pub struct RequestOrchestrator {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenManager>,
    limiter: RateLimiter,
    config: FetchConfig,
}

impl RequestOrchestrator {
    /// Create an orchestrator
    ///
    /// `limiter` may be shared with other orchestrators; its limit is also the wave size.
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenManager>,
        limiter: RateLimiter,
        config: FetchConfig,
    ) -> Self {
        Self {
            transport,
            tokens,
            limiter,
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Shared rate limiter
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Fetch every page or chunk of `descriptor` and return the aggregated rows
    ///
    /// `ids` feeds id-chunk sweeps and is ignored by the other kinds.
    ///
    /// # Errors
    /// Fatal errors unchanged; anything the cycle layer gave up on wrapped in
    /// [`FetchError::RetriesExhausted`].
    pub async fn fetch_all(
        &self,
        descriptor: &RequestDescriptor,
        ids: Option<Vec<EntityId>>,
    ) -> FetchResult<Vec<Row>> {
        let url = descriptor.url();
        info!(
            url,
            kind = descriptor.kind().label(),
            ids = ids.as_ref().map(Vec::len),
            "fetch cycle started"
        );

        let cycle_retry = self.config.cycle_retry();
        let result = cycle_retry
            .run(url, |attempt| self.run_cycle(descriptor, ids.as_deref(), attempt))
            .await;

        match result {
            Ok(rows) => {
                metrics::record_cycle("done");
                info!(url, rows = rows.len(), "fetch cycle finished");
                Ok(rows)
            }
            Err(e) if cycle_retry.retries(&e) => {
                metrics::record_cycle("failed");
                error!(url, attempts = cycle_retry.max_attempts(), error = %e, "fetch cycle failed");
                Err(FetchError::RetriesExhausted {
                    attempts: cycle_retry.max_attempts(),
                    source: Box::new(e),
                })
            }
            Err(e) => {
                metrics::record_cycle("aborted");
                error!(url, error = %e, "fetch cycle aborted");
                Err(e)
            }
        }
    }

    /// One pass over every wave, starting from an empty result
    async fn run_cycle(
        &self,
        descriptor: &RequestDescriptor,
        ids: Option<&[EntityId]>,
        attempt: u32,
    ) -> FetchResult<Vec<Row>> {
        let url = descriptor.url();
        let token = self.tokens.get_token().await?;
        let waves = pagination::batches(descriptor, self.limiter.limit(), ids.map(<[_]>::to_vec))?;
        let stop_on_empty = descriptor.kind().terminates_on_empty_wave();

        debug!(url, attempt, remaining_waves = ?waves.remaining_waves(), "cycle attempt started");

        let mut rows: Vec<Row> = Vec::new();
        for (index, batch) in waves.enumerate() {
            let wave = index + 1;
            if wave > self.config.max_waves() {
                return Err(FetchError::PaginationOverflow {
                    url: url.to_string(),
                    waves: self.config.max_waves(),
                });
            }

            let WaveRows {
                rows: wave_rows,
                exhausted_pages,
            } = self
                .config
                .wave_retry()
                .run(url, |_| self.dispatch_wave(url, &batch, &token, wave))
                .await?;

            let wave_row_count = wave_rows.len();
            rows.extend(wave_rows);
            metrics::record_wave(wave_row_count);
            info!(
                url,
                wave,
                payloads = batch.len(),
                wave_rows = wave_row_count,
                total_rows = rows.len(),
                "wave aggregated"
            );

            if stop_on_empty && (wave_row_count == 0 || exhausted_pages > 0) {
                debug!(url, wave, exhausted_pages, "sweep exhausted");
                break;
            }
        }

        Ok(rows)
    }

    /// Send every payload of a wave concurrently and wait for all of them
    ///
    /// Rows come back in completion order. If any call errors, the wave's rows are
    /// discarded and the first error is returned.
    async fn dispatch_wave(
        &self,
        url: &str,
        batch: &[Payload],
        token: &Token,
        wave: usize,
    ) -> FetchResult<WaveRows> {
        debug!(url, wave, payloads = batch.len(), "dispatching wave");

        let mut calls: FuturesUnordered<_> = batch
            .iter()
            .enumerate()
            .map(|(slot, payload)| self.dispatch_call(url, payload, token, wave, slot))
            .collect();

        let mut rows = Vec::new();
        let mut exhausted_pages = 0;
        let mut first_error = None;
        while let Some(outcome) = calls.next().await {
            match outcome {
                Ok(call) => {
                    exhausted_pages += usize::from(call.exhausted);
                    rows.extend(call.rows);
                }
                Err(e) => {
                    warn!(url, wave, error = %e, "call failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(WaveRows {
                rows,
                exhausted_pages,
            }),
        }
    }

    /// One rate-limited, time-bounded call
    async fn dispatch_call(
        &self,
        url: &str,
        payload: &Payload,
        token: &Token,
        wave: usize,
        slot: usize,
    ) -> FetchResult<CallRows> {
        let _permit = self.limiter.acquire().await?;
        let timeout = self.config.per_call_timeout();
        let degraded = CallRows {
            rows: Vec::new(),
            exhausted: false,
        };

        match tokio::time::timeout(timeout, self.transport.post(url, payload, token)).await {
            Ok(Ok(PostOutcome::Rows(rows))) => Ok(CallRows {
                exhausted: rows.is_empty(),
                rows,
            }),
            Ok(Ok(PostOutcome::EmptyResponse { status })) => {
                warn!(url, wave, slot, status, "empty response");
                if status == UNAUTHORIZED {
                    self.tokens.invalidate_if(token).await;
                }
                Ok(degraded)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    url,
                    wave,
                    slot,
                    timeout_secs = timeout.as_secs_f64(),
                    "call timed out, dropping its rows"
                );
                Ok(degraded)
            }
        }
    }
}

impl std::fmt::Debug for RequestOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOrchestrator")
            .field("limit", &self.limiter.limit())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
