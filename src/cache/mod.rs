//! Period-keyed result cache
//!
//! Fetched rows are stored per `(entity, period)`. A stored non-empty result is what
//! makes a second load within the same reporting period free of network calls.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::descriptor::Row;

pub mod file;
pub mod resolver;

pub use file::JsonFileCache;
pub use resolver::{CachedColumnResolver, IdResolver, StaticIds};

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem error
    #[error("IO error: {0}")]
    IoError(String),

    /// Lock acquisition failed
    #[error("lock error: {0}")]
    LockError(String),

    /// Serialization failed
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Stored entry is larger than the read cap
    #[error("cache entry too large: {size} bytes exceeds maximum of {max} bytes")]
    EntryTooLarge {
        /// Actual size in bytes
        size: u64,
        /// Maximum allowed size in bytes
        max: u64,
    },

    /// Entity or period is not usable as a key
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}

/// Persists aggregated rows per reporting period
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Stored rows for `(entity, period)`, if any
    async fn read(&self, entity: &str, period: &str) -> Result<Option<Vec<Row>>, CacheError>;

    /// Store rows for `(entity, period)`, replacing any previous entry
    async fn write(&self, entity: &str, period: &str, rows: &[Row]) -> Result<(), CacheError>;
}

/// Reject keys that are empty or could escape a cache directory
pub(crate) fn validate_key(kind: &str, key: &str) -> Result<(), CacheError> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(format!("{kind} {key:?}")))
    }
}

/// In-process cache, mostly for tests and single-run pipelines
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<(String, String), Vec<Row>>>,
}

impl MemoryCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing is stored
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn read(&self, entity: &str, period: &str) -> Result<Option<Vec<Row>>, CacheError> {
        validate_key("entity", entity)?;
        validate_key("period", period)?;
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(entity.to_string(), period.to_string()))
            .cloned())
    }

    async fn write(&self, entity: &str, period: &str, rows: &[Row]) -> Result<(), CacheError> {
        validate_key("entity", entity)?;
        validate_key("period", period)?;
        debug!(entity, period, rows = rows.len(), "storing rows in memory cache");
        self.entries
            .write()
            .await
            .insert((entity.to_string(), period.to_string()), rows.to_vec());
        Ok(())
    }
}
