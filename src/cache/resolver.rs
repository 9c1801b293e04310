//! Id resolution for id-chunked sweeps
//!
//! Ratings, accrued interest and similar endpoints are queried per instrument or issuer.
//! The ids come from another entity already cached for the same period.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::ResultCache;
use crate::descriptor::EntityId;
use crate::fetcher::{FetchError, FetchResult};
use crate::period::ReportPeriod;

/// Supplies the ordered, de-duplicated id set for a period
#[async_trait]
pub trait IdResolver: Send + Sync {
    /// Ids to sweep for `period`
    async fn resolve(&self, period: &ReportPeriod) -> FetchResult<Vec<EntityId>>;
}

/// Distinct values of one column of another cached entity
pub struct CachedColumnResolver {
    cache: Arc<dyn ResultCache>,
    entity: String,
    column: String,
}

impl CachedColumnResolver {
    /// Resolve ids from `entity.column` in `cache`
    pub fn new(cache: Arc<dyn ResultCache>, entity: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            cache,
            entity: entity.into(),
            column: column.into(),
        }
    }

    /// Source entity
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Source column
    pub fn column(&self) -> &str {
        &self.column
    }
}

#[async_trait]
impl IdResolver for CachedColumnResolver {
    async fn resolve(&self, period: &ReportPeriod) -> FetchResult<Vec<EntityId>> {
        let key = period.key();
        let rows = self.cache.read(&self.entity, &key).await?.unwrap_or_default();

        let mut seen = HashSet::new();
        let mut skipped = 0usize;
        let mut ids = Vec::new();
        for row in &rows {
            match row.get(&self.column).and_then(EntityId::from_value) {
                Some(id) => {
                    if seen.insert(id.clone()) {
                        ids.push(id);
                    }
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(
                entity = %self.entity,
                column = %self.column,
                skipped,
                "rows without a usable id"
            );
        }
        debug!(
            entity = %self.entity,
            column = %self.column,
            period = %key,
            rows = rows.len(),
            ids = ids.len(),
            "ids resolved"
        );

        if ids.is_empty() {
            return Err(FetchError::EmptyIdSet(format!(
                "{}.{} for period {key}",
                self.entity, self.column
            )));
        }
        Ok(ids)
    }
}

impl fmt::Debug for CachedColumnResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedColumnResolver")
            .field("entity", &self.entity)
            .field("column", &self.column)
            .finish_non_exhaustive()
    }
}

/// Fixed id list
#[derive(Debug, Clone)]
pub struct StaticIds(pub Vec<EntityId>);

#[async_trait]
impl IdResolver for StaticIds {
    async fn resolve(&self, _period: &ReportPeriod) -> FetchResult<Vec<EntityId>> {
        Ok(self.0.clone())
    }
}
