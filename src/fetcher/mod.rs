//! Request primitives: error taxonomy, transport, token lifecycle, pagination and retry

use async_trait::async_trait;

use crate::cache::CacheError;
use crate::descriptor::{Payload, Row};
use crate::orchestrator::rate_limit::RateLimitError;

pub mod http;
pub mod pagination;
pub mod retry;
pub mod token;

pub use http::HttpTransport;
pub use pagination::{batches, Batch, Batches};
pub use retry::{RetryOn, RetryPolicy};
pub use token::{Authenticator, Credentials, HttpAuthenticator, Token, TokenManager};

/// Fetch errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection-level failure (refused, reset, DNS); transient
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// Request or response timed out; transient
    #[error("timeout: {0}")]
    TimeoutFailure(String),

    /// Response body could not be decoded into rows
    #[error("parse error: {0}")]
    Parse(String),

    /// Token acquisition failed; aborts the run
    #[error("authentication failed: {0}")]
    AuthFailure(String),

    /// An id-chunked sweep resolved no ids
    #[error("id set is empty for {0}; upstream reference data not ready for this period")]
    EmptyIdSet(String),

    /// A page sweep never produced an empty wave
    #[error("pagination for {url} exceeded {waves} waves without an empty wave")]
    PaginationOverflow {
        /// Endpoint URL
        url: String,
        /// Wave bound that was hit
        waves: usize,
    },

    /// Rate limiter could not hand out a permit
    #[error("rate limiter error: {0}")]
    RateLimit(#[from] RateLimitError),

    /// Result cache read or write failed
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Invalid descriptor or client configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// The cycle-level retry layer gave up
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Attempts made by the exhausted layer
        attempts: u32,
        /// Last underlying failure
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Connection failures and timeouts
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::ConnectionFailure(_) | FetchError::TimeoutFailure(_)
        )
    }

    /// Errors that no retry layer may absorb
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::AuthFailure(_)
                | FetchError::EmptyIdSet(_)
                | FetchError::PaginationOverflow { .. }
                | FetchError::RateLimit(_)
                | FetchError::Cache(_)
                | FetchError::Config(_)
        )
    }

    /// Classify a reqwest error into the fetch taxonomy
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::TimeoutFailure(err.to_string())
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else if err.is_builder() {
            FetchError::Config(err.to_string())
        } else {
            FetchError::ConnectionFailure(err.to_string())
        }
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Interpreted outcome of one successful round trip
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    /// 2xx with a (possibly empty) row sequence
    Rows(Vec<Row>),
    /// Non-2xx; degraded to "no rows" instead of an error
    EmptyResponse {
        /// HTTP status returned upstream
        status: u16,
    },
}

impl PostOutcome {
    /// Rows carried by the outcome (none for an empty response)
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            PostOutcome::Rows(rows) => rows,
            PostOutcome::EmptyResponse { .. } => Vec::new(),
        }
    }
}

/// One authenticated JSON POST
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `payload` to `url` with `token` as bearer credentials
    ///
    /// # Errors
    /// `ConnectionFailure` and `TimeoutFailure` for transient network problems, `Parse`
    /// for a 2xx body that is not a row sequence. Non-2xx statuses are not errors.
    async fn post(&self, url: &str, payload: &Payload, token: &Token) -> FetchResult<PostOutcome>;
}
