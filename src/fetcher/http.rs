//! HTTP transport for the data API
//!
//! Provides the reqwest-backed [`Transport`] with:
//! - bearer-token JSON POST requests
//! - row decoding for array, object and empty bodies
//! - a mandatory pacing pause after every successful call
//! - non-2xx responses degraded to [`PostOutcome::EmptyResponse`]

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::descriptor::{Payload, Row};
use crate::fetcher::token::Token;
use crate::fetcher::{FetchError, FetchResult, PostOutcome, Transport};
use crate::metrics;
use crate::orchestrator::config::{
    HTTP_CONNECT_TIMEOUT_SECS, HTTP_REQUEST_TIMEOUT_SECS, PACING_MS,
};

/// User agent sent with every request
const USER_AGENT: &str = concat!("refdata-harvester/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the transport and the authenticator
///
/// Configured with explicit timeouts to prevent indefinite hangs:
/// - Connect timeout: 10 seconds
/// - Request timeout: 600 seconds
pub fn build_http_client() -> FetchResult<Arc<Client>> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .map(Arc::new)
        .map_err(|e| FetchError::Config(format!("failed to build HTTP client: {e}")))
}

/// reqwest-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Arc<Client>,
    pacing: Duration,
}

impl HttpTransport {
    /// Create a transport with the default pacing pause
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            client,
            pacing: Duration::from_millis(PACING_MS),
        }
    }

    /// Override the pause taken after each successful call
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Pause taken after each successful call
    pub fn pacing(&self) -> Duration {
        self.pacing
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &str, payload: &Payload, token: &Token) -> FetchResult<PostOutcome> {
        debug!(url, fields = payload.len(), "POST");

        let response = self
            .client
            .post(url)
            .bearer_auth(token.value())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        metrics::record_http_request(status.as_u16());

        if !status.is_success() {
            // Upstream rejections read as "no data"; callers see a named outcome instead.
            let body = response.text().await.unwrap_or_default();
            warn!(
                url,
                status = status.as_u16(),
                body = %truncate(&body, 200),
                "non-success response treated as empty"
            );
            metrics::record_empty_response(status.as_u16());
            return Ok(PostOutcome::EmptyResponse {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(FetchError::from_reqwest)?;
        let rows = parse_rows(&body)?;
        debug!(url, rows = rows.len(), "response decoded");

        tokio::time::sleep(self.pacing).await;
        Ok(PostOutcome::Rows(rows))
    }
}

/// Decode a response body into rows
///
/// An empty body or `null` is no rows, an array must hold objects, and a lone object
/// counts as one row.
pub fn parse_rows(body: &[u8]) -> FetchResult<Vec<Row>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|e| FetchError::Parse(format!("response is not JSON: {e}")))?;

    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(row) => Ok(row),
                other => Err(FetchError::Parse(format!(
                    "element {index} is not an object: {}",
                    type_name(&other)
                ))),
            })
            .collect(),
        Value::Object(row) => Ok(vec![row]),
        other => Err(FetchError::Parse(format!(
            "expected array of rows, got {}",
            type_name(&other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
