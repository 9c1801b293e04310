//! JSON file cache
//!
//! Layout: `<root>/<entity>/<period>.json`, one file per entry.
//! Writes are atomic (temp file + rename) and serialized through an fd-lock on a
//! sibling `.lock` file, so concurrent runs never observe a half-written entry.

use async_trait::async_trait;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{validate_key, CacheError, ResultCache};
use crate::descriptor::Row;

/// Current cache entry schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum entry size accepted on read (512 MB)
pub const MAX_ENTRY_SIZE: u64 = 512 * 1024 * 1024;

/// On-disk entry
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    schema_version: String,
    entity: String,
    period: String,
    written_at: i64,
    rows: Vec<Row>,
}

/// Cache storing one JSON file per `(entity, period)`
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    root: PathBuf,
    max_entry_size: u64,
}

impl JsonFileCache {
    /// Create a cache rooted at `root` (created lazily on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_entry_size: MAX_ENTRY_SIZE,
        }
    }

    /// Override the read size cap
    pub fn with_max_entry_size(mut self, max: u64) -> Self {
        self.max_entry_size = max;
        self
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry for `(entity, period)`
    pub fn entry_path(&self, entity: &str, period: &str) -> Result<PathBuf, CacheError> {
        validate_key("entity", entity)?;
        validate_key("period", period)?;
        Ok(self.root.join(entity).join(format!("{period}.json")))
    }
}

#[async_trait]
impl ResultCache for JsonFileCache {
    async fn read(&self, entity: &str, period: &str) -> Result<Option<Vec<Row>>, CacheError> {
        let path = self.entry_path(entity, period)?;
        let max = self.max_entry_size;
        tokio::task::spawn_blocking(move || load_entry(&path, max))
            .await
            .map_err(|e| CacheError::IoError(format!("cache read task failed: {e}")))?
    }

    async fn write(&self, entity: &str, period: &str, rows: &[Row]) -> Result<(), CacheError> {
        let path = self.entry_path(entity, period)?;
        let entry = CacheEntry {
            schema_version: SCHEMA_VERSION.to_string(),
            entity: entity.to_string(),
            period: period.to_string(),
            written_at: chrono::Utc::now().timestamp_millis(),
            rows: rows.to_vec(),
        };
        tokio::task::spawn_blocking(move || save_entry(&path, &entry))
            .await
            .map_err(|e| CacheError::IoError(format!("cache write task failed: {e}")))?
    }
}

fn open_lock_file(path: &Path) -> Result<std::fs::File, CacheError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path.with_extension("lock"))
        .map_err(|e| CacheError::LockError(format!("Failed to create lock file: {e}")))
}

fn save_entry(path: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
    let parent = path
        .parent()
        .ok_or_else(|| CacheError::IoError(format!("{} has no parent", path.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| CacheError::IoError(e.to_string()))?;

    let json = serde_json::to_vec(entry)
        .map_err(|e| CacheError::SerializationError(e.to_string()))?;

    let mut lock = RwLock::new(open_lock_file(path)?);
    let _guard = lock
        .write()
        .map_err(|e| CacheError::LockError(format!("Failed to acquire write lock: {e}")))?;

    let mut temp_file = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| CacheError::IoError(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(&json)
        .map_err(|e| CacheError::IoError(format!("Failed to write temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| CacheError::IoError(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| CacheError::IoError(format!("Failed to persist temp file: {e}")))?;

    info!(
        path = %path.display(),
        entity = %entry.entity,
        period = %entry.period,
        rows = entry.rows.len(),
        "cache entry saved"
    );
    Ok(())
}

fn load_entry(path: &Path, max_size: u64) -> Result<Option<Vec<Row>>, CacheError> {
    if !path.exists() {
        debug!(path = %path.display(), "cache miss");
        return Ok(None);
    }

    let lock = RwLock::new(open_lock_file(path)?);
    let _guard = lock
        .read()
        .map_err(|e| CacheError::LockError(format!("Failed to acquire read lock: {e}")))?;

    let size = std::fs::metadata(path)
        .map_err(|e| CacheError::IoError(e.to_string()))?
        .len();
    if size > max_size {
        return Err(CacheError::EntryTooLarge {
            size,
            max: max_size,
        });
    }

    let contents = std::fs::read(path).map_err(|e| CacheError::IoError(e.to_string()))?;
    let entry: CacheEntry = match serde_json::from_slice(&contents) {
        Ok(entry) => entry,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable cache entry, treating as miss");
            return Ok(None);
        }
    };

    if entry.schema_version != SCHEMA_VERSION {
        warn!(
            found_version = %entry.schema_version,
            expected_version = SCHEMA_VERSION,
            "cache entry schema mismatch, treating as miss"
        );
        return Ok(None);
    }

    debug!(path = %path.display(), rows = entry.rows.len(), "cache hit");
    Ok(Some(entry.rows))
}
