//! Observability metrics for fetch cycles
//!
//! Counters, gauges and histograms for HTTP calls, degraded responses, retries,
//! rate limiter pressure and cycle outcomes.
//!
//! ## Architecture
//!
//! - Uses the `metrics` crate facade; without an installed recorder every call is a no-op
//! - Optional Prometheus exporter for a scrape endpoint (e.g. `:9090/metrics`)

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};

static METRICS_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Metrics errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}

/// Install the Prometheus exporter and register metric descriptions
///
/// Idempotent: later calls are no-ops. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if METRICS_INITIALIZED.get().is_some() {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the data API"
    );
    describe_counter!(
        "http_empty_responses_total",
        Unit::Count,
        "Non-success responses degraded to an empty row sequence"
    );
    describe_counter!(
        "fetch_retries_total",
        Unit::Count,
        "Retry attempts by layer (wave or cycle)"
    );
    describe_counter!(
        "waves_dispatched_total",
        Unit::Count,
        "Waves dispatched and aggregated"
    );
    describe_histogram!(
        "wave_rows",
        Unit::Count,
        "Rows aggregated per wave"
    );
    describe_histogram!(
        "rate_limit_queue_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a rate limit permit"
    );
    describe_gauge!(
        "rate_limit_permits_available",
        Unit::Count,
        "Currently available rate limit permits"
    );
    describe_counter!(
        "fetch_cycles_total",
        Unit::Count,
        "Fetch cycles by outcome (done, failed, aborted)"
    );

    let _ = METRICS_INITIALIZED.set(());
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Whether the exporter has been installed
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.get().is_some()
}

/// Record one HTTP round trip
pub fn record_http_request(status: u16) {
    counter!("http_requests_total", "status" => status.to_string()).increment(1);
}

/// Record a non-success response that was degraded to no rows
pub fn record_empty_response(status: u16) {
    counter!("http_empty_responses_total", "status" => status.to_string()).increment(1);
}

/// Record a retry scheduled by `layer`
pub fn record_retry(layer: &'static str) {
    counter!("fetch_retries_total", "layer" => layer).increment(1);
}

/// Record an aggregated wave
pub fn record_wave(rows: usize) {
    counter!("waves_dispatched_total").increment(1);
    histogram!("wave_rows").record(rows as f64);
}

/// Record a granted rate limit permit
pub fn record_permit_acquired(waited: Duration, available: usize) {
    histogram!("rate_limit_queue_wait_seconds").record(waited.as_secs_f64());
    gauge!("rate_limit_permits_available").set(available as f64);

    if waited.as_millis() > 100 {
        debug!(
            wait_ms = waited.as_millis(),
            "Rate limit permit acquired after wait"
        );
    }
}

/// Record a finished fetch cycle
pub fn record_cycle(outcome: &'static str) {
    counter!("fetch_cycles_total", "outcome" => outcome).increment(1);
}
