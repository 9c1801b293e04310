//! Endpoint catalog
//!
//! The catalog lists every endpoint the harvester knows how to load: its path, pagination
//! kind, payload template and, for id-chunked sweeps, where the ids come from.
//! It is embedded in the binary and parsed once.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{CachedColumnResolver, IdResolver, ResultCache, StaticIds};
use crate::descriptor::{EntityId, PaginationKind, Payload, RequestDescriptor};
use crate::period::ReportPeriod;

/// Embedded catalog data
const CATALOG_JSON: &str = include_str!("endpoints.json");

/// Global catalog instance (loaded once)
static CATALOG: Lazy<Result<Catalog, CatalogError>> = Lazy::new(|| Catalog::from_json(CATALOG_JSON));

/// Date placeholders accepted in payload templates
const PLACEHOLDERS: [&str; 4] = [
    "$report_date",
    "$report_date_minus_30",
    "$work_date",
    "$work_date_minus_30",
];

/// Where an id-chunked sweep gets its ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum IdSource {
    /// Distinct values of `entity.column`, cached for the same period
    Cached {
        /// Source entity
        entity: String,
        /// Source column
        column: String,
    },
    /// A fixed list
    Fixed {
        /// Ids in request order
        values: Vec<EntityId>,
    },
}

impl IdSource {
    /// Build the resolver for this source
    pub fn resolver(&self, cache: Arc<dyn ResultCache>) -> Box<dyn IdResolver> {
        match self {
            IdSource::Cached { entity, column } => {
                Box::new(CachedColumnResolver::new(cache, entity.clone(), column.clone()))
            }
            IdSource::Fixed { values } => Box::new(StaticIds(values.clone())),
        }
    }
}

/// Catalog entry as stored in the embedded JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Entity name, also the cache key
    pub name: String,
    /// Path relative to the API base URL
    pub path: String,
    /// Pagination kind
    pub pagination: PaginationKind,
    /// Payload template, may contain date placeholders
    #[serde(default)]
    pub template: Payload,
    /// Id source for id-chunked sweeps
    #[serde(default)]
    pub ids: Option<IdSource>,
}

/// Endpoint resolved for one period and base URL
#[derive(Debug, Clone)]
pub struct Endpoint {
    name: String,
    descriptor: RequestDescriptor,
    ids: Option<IdSource>,
}

impl Endpoint {
    /// Endpoint from parts, for endpoints outside the catalog
    pub fn new(name: impl Into<String>, descriptor: RequestDescriptor, ids: Option<IdSource>) -> Self {
        Self {
            name: name.into(),
            descriptor,
            ids,
        }
    }

    /// Entity name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request descriptor with placeholders substituted
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    /// Id source, for id-chunked sweeps
    pub fn ids(&self) -> Option<&IdSource> {
        self.ids.as_ref()
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[allow(dead_code)]
    schema_version: String,
    default_base_url: String,
    login_path: String,
    endpoints: Vec<EndpointSpec>,
}

/// Catalog of known endpoints
#[derive(Debug, Clone)]
pub struct Catalog {
    default_base_url: String,
    login_path: String,
    entries: Vec<EndpointSpec>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Load the embedded catalog
    ///
    /// This is a singleton operation - the catalog is parsed once and cached.
    pub fn load() -> Result<&'static Self, &'static CatalogError> {
        CATALOG.as_ref()
    }

    /// Parse and validate a catalog from JSON
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = serde_json::from_str(json)
            .map_err(|e| CatalogError::ParseError(format!("Failed to parse catalog: {e}")))?;

        let mut index = HashMap::new();
        for (position, entry) in raw.endpoints.iter().enumerate() {
            validate_entry(entry)?;
            if index.insert(entry.name.clone(), position).is_some() {
                return Err(CatalogError::Invalid(format!(
                    "duplicate endpoint {}",
                    entry.name
                )));
            }
        }

        Ok(Self {
            default_base_url: raw.default_base_url,
            login_path: raw.login_path,
            entries: raw.endpoints,
            index,
        })
    }

    /// Base URL used when none is configured
    pub fn default_base_url(&self) -> &str {
        &self.default_base_url
    }

    /// Login URL under `base_url`
    pub fn login_url(&self, base_url: &str) -> String {
        join_url(base_url, &self.login_path)
    }

    /// Entries in catalog order
    pub fn entries(&self) -> &[EndpointSpec] {
        &self.entries
    }

    /// Endpoint names in catalog order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Raw entry by name
    pub fn spec(&self, name: &str) -> Option<&EndpointSpec> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Resolve `name` for `period` under `base_url`
    pub fn endpoint(
        &self,
        name: &str,
        period: &ReportPeriod,
        base_url: &str,
    ) -> Result<Endpoint, CatalogError> {
        let spec = self
            .spec(name)
            .ok_or_else(|| CatalogError::NotFound(format!("Endpoint {name} not found in catalog")))?;

        let mut template = Payload::new();
        for (key, value) in &spec.template {
            template.insert(key.clone(), substitute(value, period)?);
        }

        let descriptor = RequestDescriptor::new(
            join_url(base_url, &spec.path),
            template,
            spec.pagination.clone(),
        )
        .map_err(|e| CatalogError::Invalid(format!("{name}: {e}")))?;

        Ok(Endpoint {
            name: spec.name.clone(),
            descriptor,
            ids: spec.ids.clone(),
        })
    }
}

fn validate_entry(entry: &EndpointSpec) -> Result<(), CatalogError> {
    if entry.name.is_empty() || entry.path.is_empty() {
        return Err(CatalogError::Invalid(
            "endpoint name and path must not be empty".to_string(),
        ));
    }
    match (&entry.pagination, &entry.ids) {
        (PaginationKind::IdChunkSweep { .. }, None) => Err(CatalogError::Invalid(format!(
            "{}: id-chunked sweep without an id source",
            entry.name
        ))),
        (PaginationKind::IdChunkSweep { .. }, Some(_)) => Ok(()),
        (_, Some(_)) => Err(CatalogError::Invalid(format!(
            "{}: id source on an endpoint that takes no ids",
            entry.name
        ))),
        (_, None) => Ok(()),
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Replace date placeholders anywhere inside `value`
fn substitute(value: &Value, period: &ReportPeriod) -> Result<Value, CatalogError> {
    Ok(match value {
        Value::String(s) if s.starts_with('$') => {
            let date = match s.as_str() {
                "$report_date" => period.report_date(),
                "$report_date_minus_30" => period.report_date_minus(30),
                "$work_date" => period.work_date(),
                "$work_date_minus_30" => period.work_date_minus(30),
                other => {
                    return Err(CatalogError::UnknownPlaceholder {
                        placeholder: other.to_string(),
                        known: PLACEHOLDERS.join(", "),
                    })
                }
            };
            Value::String(date.format("%Y-%m-%d").to_string())
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, period))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, item) in map {
                out.insert(key.clone(), substitute(item, period)?);
            }
            Value::Object(out)
        }
        other => other.clone(),
    })
}

/// Catalog errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    /// Endpoint not in the catalog
    #[error("Not found: {0}")]
    NotFound(String),

    /// Catalog JSON could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Catalog entry is inconsistent
    #[error("Invalid catalog entry: {0}")]
    Invalid(String),

    /// Template uses a placeholder that is not defined
    #[error("unknown placeholder {placeholder} (known: {known})")]
    UnknownPlaceholder {
        /// Offending placeholder
        placeholder: String,
        /// Accepted placeholders
        known: String,
    },
}
