//! Period loader
//!
//! Ties the cache and the orchestrator together: a cached `(entity, period)` result is
//! returned as-is, otherwise ids are resolved, every page is fetched and the result is
//! stored for the period.

use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{IdResolver, ResultCache};
use crate::catalog::Endpoint;
use crate::descriptor::{RequestDescriptor, Row};
use crate::fetcher::FetchResult;
use crate::orchestrator::RequestOrchestrator;
use crate::period::ReportPeriod;

/// Where loaded rows came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Served from the result cache, no network calls
    Cache,
    /// Fetched from the API
    Network,
}

/// Rows loaded for one entity
#[derive(Debug, Clone)]
pub struct Loaded {
    /// Entity name
    pub entity: String,
    /// Aggregated rows
    pub rows: Vec<Row>,
    /// Where they came from
    pub source: LoadSource,
}

/// Loads entities for one reporting period
#[derive(Clone)]
pub struct PeriodLoader {
    orchestrator: Arc<RequestOrchestrator>,
    cache: Arc<dyn ResultCache>,
    period: ReportPeriod,
}

impl PeriodLoader {
    /// Create a loader for `period`
    pub fn new(
        orchestrator: Arc<RequestOrchestrator>,
        cache: Arc<dyn ResultCache>,
        period: ReportPeriod,
    ) -> Self {
        Self {
            orchestrator,
            cache,
            period,
        }
    }

    /// Period being loaded
    pub fn period(&self) -> &ReportPeriod {
        &self.period
    }

    /// Shared result cache
    pub fn cache(&self) -> Arc<dyn ResultCache> {
        Arc::clone(&self.cache)
    }

    /// Load a catalog endpoint, resolving ids from its id source
    pub async fn load_endpoint(&self, endpoint: &Endpoint) -> FetchResult<Loaded> {
        let resolver = endpoint.ids().map(|source| source.resolver(self.cache()));
        self.load(endpoint.name(), endpoint.descriptor(), resolver.as_deref())
            .await
    }

    /// Load `entity` through `descriptor`
    ///
    /// An empty cached result counts as a miss. Empty fetch results are not stored.
    pub async fn load(
        &self,
        entity: &str,
        descriptor: &RequestDescriptor,
        resolver: Option<&dyn IdResolver>,
    ) -> FetchResult<Loaded> {
        let period = self.period.key();

        match self.cache.read(entity, &period).await? {
            Some(rows) if !rows.is_empty() => {
                info!(entity, period = %period, rows = rows.len(), "loaded from cache");
                return Ok(Loaded {
                    entity: entity.to_string(),
                    rows,
                    source: LoadSource::Cache,
                });
            }
            Some(_) => info!(entity, period = %period, "cached result is empty, refetching"),
            None => info!(entity, period = %period, "cache miss, fetching"),
        }

        let ids = match resolver {
            Some(resolver) => Some(resolver.resolve(&self.period).await?),
            None => None,
        };

        let rows = self.orchestrator.fetch_all(descriptor, ids).await?;

        if rows.is_empty() {
            warn!(entity, period = %period, "fetch returned no rows, nothing cached");
        } else {
            self.cache.write(entity, &period, &rows).await?;
            info!(entity, period = %period, rows = rows.len(), "result cached");
        }

        Ok(Loaded {
            entity: entity.to_string(),
            rows,
            source: LoadSource::Network,
        })
    }
}

impl std::fmt::Debug for PeriodLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodLoader")
            .field("period", &self.period)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}
