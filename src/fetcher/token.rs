//! Bearer-token lifecycle
//!
//! The [`TokenManager`] obtains a token once and reuses it for every request in the
//! run. Acquisition happens under an async mutex, so concurrent callers wait for the
//! single in-flight login instead of issuing their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::fetcher::{FetchError, FetchResult};

/// Bearer token issued by the login endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    obtained_at: DateTime<Utc>,
}

impl Token {
    /// Wrap a freshly issued token value
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            obtained_at: Utc::now(),
        }
    }

    /// Raw token value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the token was issued to us
    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// Login credentials sent to the authentication endpoint
#[derive(Clone, Serialize)]
pub struct Credentials {
    login: String,
    password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// Login name
    pub fn login(&self) -> &str {
        &self.login
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Something that can exchange configured credentials for a token value
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Issue the authentication request
    ///
    /// # Errors
    /// `AuthFailure` on any failure; callers must not retry.
    async fn authenticate(&self) -> FetchResult<String>;
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

/// Authenticator posting credentials to the login endpoint
#[derive(Debug, Clone)]
pub struct HttpAuthenticator {
    client: Arc<Client>,
    url: String,
    credentials: Credentials,
}

impl HttpAuthenticator {
    /// Create an authenticator for `url`
    pub fn new(client: Arc<Client>, url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            client,
            url: url.into(),
            credentials,
        }
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self) -> FetchResult<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.credentials)
            .send()
            .await
            .map_err(|e| FetchError::AuthFailure(format!("login request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::AuthFailure(format!(
                "login rejected with status {status}"
            )));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| FetchError::AuthFailure(format!("malformed login response: {e}")))?;

        match body.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(FetchError::AuthFailure(
                "login response carried no token".to_string(),
            )),
        }
    }
}

/// Owns the run's bearer token
pub struct TokenManager {
    authenticator: Arc<dyn Authenticator>,
    cached: Mutex<Option<Token>>,
}

impl TokenManager {
    /// Create a manager with no token yet
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator,
            cached: Mutex::new(None),
        }
    }

    /// Return the cached token, logging in first if there is none
    ///
    /// Concurrent callers block on the same lock, so at most one login is in flight.
    pub async fn get_token(&self) -> FetchResult<Token> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        info!("Getting token started");
        match self.authenticator.authenticate().await {
            Ok(value) => {
                let token = Token::new(value);
                *cached = Some(token.clone());
                info!(obtained_at = %token.obtained_at(), "Getting token finished");
                Ok(token)
            }
            Err(e) => {
                error!(error = %e, "Getting token failed");
                Err(e)
            }
        }
    }

    /// Drop the cached token so the next [`get_token`](Self::get_token) logs in again
    pub async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        if cached.take().is_some() {
            info!("Token invalidated");
        }
    }

    /// Drop the cached token only if it is still `rejected`
    ///
    /// A 401 that arrives after another caller already logged in again leaves the newer
    /// token in place.
    pub async fn invalidate_if(&self, rejected: &Token) {
        let mut cached = self.cached.lock().await;
        match cached.as_ref() {
            Some(current) if current.value() == rejected.value() => {
                *cached = None;
                info!("Token invalidated");
            }
            Some(_) => debug!("Token already replaced, keeping it"),
            None => {}
        }
    }

    /// Whether a token is currently cached
    pub async fn has_token(&self) -> bool {
        self.cached.lock().await.is_some()
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager").finish_non_exhaustive()
    }
}
