//! # Reference Data Harvester Library
//!
//! Retrieves reference and market data from a paginated, authenticated, rate-limited
//! JSON API, assembles complete result sets across pages and id chunks, and caches
//! them per reporting period.
//!
//! ## Features
//!
//! - **Token Lifecycle**: one lazily obtained bearer token per run, refreshed on demand
//! - **Pagination Kinds**: single call, page-number sweep, pager-object sweep, id-chunked sweep
//! - **Rate Limiting**: never more than `limit` requests in flight
//! - **Two-Layer Retry**: a failed wave is re-dispatched, a failed cycle restarts from scratch
//! - **Idempotent Loads**: a cached `(entity, period)` result costs zero network calls
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use refdata_harvester::cache::{JsonFileCache, ResultCache};
//! use refdata_harvester::catalog::Catalog;
//! use refdata_harvester::fetcher::http::{build_http_client, HttpTransport};
//! use refdata_harvester::fetcher::token::{Credentials, HttpAuthenticator, TokenManager};
//! use refdata_harvester::loader::PeriodLoader;
//! use refdata_harvester::orchestrator::config::DEFAULT_LIMIT;
//! use refdata_harvester::orchestrator::{FetchConfig, RateLimiter, RequestOrchestrator};
//! use refdata_harvester::period::{HolidayCalendar, ReportPeriod};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = Catalog::load().map_err(|e| e.clone())?;
//! let base_url = catalog.default_base_url();
//! let period = ReportPeriod::for_today(chrono::Local::now().date_naive(), &HolidayCalendar::new())?;
//!
//! let client = build_http_client()?;
//! let credentials = Credentials::new("login", "password");
//! let auth = HttpAuthenticator::new(client.clone(), catalog.login_url(base_url), credentials);
//! let tokens = Arc::new(TokenManager::new(Arc::new(auth)));
//!
//! let orchestrator = Arc::new(RequestOrchestrator::new(
//!     Arc::new(HttpTransport::new(client)),
//!     tokens,
//!     RateLimiter::new(DEFAULT_LIMIT),
//!     FetchConfig::default(),
//! ));
//! let cache: Arc<dyn ResultCache> = Arc::new(JsonFileCache::new("data/cache"));
//! let loader = PeriodLoader::new(orchestrator, cache, period);
//!
//! let emitents = catalog.endpoint("Emitents", &period, base_url)?;
//! let loaded = loader.load_endpoint(&emitents).await?;
//! println!("{} rows", loaded.rows.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`descriptor`] - endpoint descriptors, pagination kinds and id placement
//! - [`fetcher`] - transport, token manager, batch generation and retry policy
//! - [`orchestrator`] - rate limiter and the wave-by-wave fetch cycle
//! - [`cache`] - period-keyed result caches and id resolvers
//! - [`catalog`] - embedded endpoint catalog
//! - [`period`] - reporting period and holiday calendar
//! - [`loader`] - cache-or-fetch loading of one entity

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Period-keyed result caches
pub mod cache;

/// Embedded endpoint catalog
pub mod catalog;

/// CLI command implementations
pub mod cli;

/// Endpoint descriptors
pub mod descriptor;

/// Transport, tokens, pagination and retry
pub mod fetcher;

/// Cache-or-fetch loading
pub mod loader;

/// Prometheus metrics
pub mod metrics;

/// Fetch cycle orchestration
pub mod orchestrator;

/// Reporting period
pub mod period;

// Re-export commonly used types
pub use descriptor::{EntityId, IdPlacement, PaginationKind, RequestDescriptor, Row};
pub use fetcher::{FetchError, FetchResult, PostOutcome, Transport};
pub use orchestrator::RequestOrchestrator;
pub use period::ReportPeriod;
