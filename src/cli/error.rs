//! CLI error types and conversions

use crate::catalog::CatalogError;
use crate::fetcher::FetchError;
use crate::metrics::MetricsError;
use crate::period::PeriodError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Catalog error
    #[error("catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    /// Fetch error
    #[error("fetch error: {0}")]
    FetchError(#[from] FetchError),

    /// Period error
    #[error("period error: {0}")]
    PeriodError(#[from] PeriodError),

    /// Metrics error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// An endpoint failed; later endpoints were not attempted
    #[error("endpoint {endpoint} failed: {source}")]
    EndpointFailed {
        /// Name of the failed endpoint
        endpoint: String,
        /// Error that ended the run
        source: FetchError,
    },
}
