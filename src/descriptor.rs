//! Endpoint descriptors and pagination kinds
//!
//! A [`RequestDescriptor`] captures everything needed to sweep one logical endpoint:
//! the URL, the JSON payload template and the [`PaginationKind`] that decides how the
//! template is turned into batches of payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::fetcher::{FetchError, FetchResult};

/// One row returned by the API (a JSON object)
pub type Row = Map<String, Value>;

/// One request body sent to the API (a JSON object)
pub type Payload = Map<String, Value>;

/// Default top-level page-number field used by page sweeps
pub const DEFAULT_PAGE_FIELD: &str = "pageNum";

/// Default nested pager field used by pager-object sweeps
pub const DEFAULT_PAGER_FIELD: &str = "pager";

fn default_page_field() -> String {
    DEFAULT_PAGE_FIELD.to_string()
}

fn default_pager_field() -> String {
    DEFAULT_PAGER_FIELD.to_string()
}

/// Identifier fed into id-chunked sweeps (instrument id, issuer id, ISIN, currency code...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// Numeric identifier
    Int(i64),
    /// Textual identifier
    Text(String),
}

impl EntityId {
    /// Extract an id from a cached row value.
    ///
    /// Integral numbers and non-empty strings are ids; everything else is skipped.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityId::Int),
            Value::String(s) if !s.is_empty() => Some(EntityId::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<&EntityId> for Value {
    fn from(id: &EntityId) -> Self {
        match id {
            EntityId::Int(n) => Value::from(*n),
            EntityId::Text(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Int(n)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId::Text(s.to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(n) => write!(f, "{n}"),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

/// Where a chunk of ids is written inside a payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum IdPlacement {
    /// `field: [id, id, ...]`
    List {
        /// Payload field receiving the chunk
        field: String,
    },
    /// `field: [{"id": [id, id, ...], "idType": id_type}]`
    Tagged {
        /// Payload field receiving the tagged chunk
        field: String,
        /// Value of the `idType` discriminator
        id_type: String,
    },
    /// `field: id`, one id per call
    Scalar {
        /// Payload field receiving the id
        field: String,
    },
}

impl IdPlacement {
    /// Write `chunk` into `payload`, replacing whatever the template held there.
    pub fn apply(&self, payload: &mut Payload, chunk: &[EntityId]) {
        let list = || Value::Array(chunk.iter().map(Value::from).collect());
        match self {
            IdPlacement::List { field } => {
                payload.insert(field.clone(), list());
            }
            IdPlacement::Tagged { field, id_type } => {
                let mut tagged = Map::new();
                tagged.insert("id".to_string(), list());
                tagged.insert("idType".to_string(), Value::from(id_type.as_str()));
                payload.insert(field.clone(), Value::Array(vec![Value::Object(tagged)]));
            }
            IdPlacement::Scalar { field } => {
                let value = chunk.first().map(Value::from).unwrap_or(Value::Null);
                payload.insert(field.clone(), value);
            }
        }
    }
}

/// How an endpoint is paginated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaginationKind {
    /// One call with the template as-is
    Single,
    /// Increment a top-level page-number field until a wave comes back empty
    PageSweep {
        /// Name of the page-number field
        #[serde(default = "default_page_field")]
        page_field: String,
    },
    /// Increment `pager.page` inside a nested `{page, size}` object until a wave comes back empty
    PagerObjectSweep {
        /// Name of the nested pager object
        #[serde(default = "default_pager_field")]
        pager_field: String,
        /// Page size written into the pager object
        page_size: u32,
    },
    /// Partition a resolved id set into chunks, one call per chunk, exhaustively
    IdChunkSweep {
        /// Ids per call
        chunk_size: usize,
        /// Where each chunk goes in the payload
        placement: IdPlacement,
    },
}

impl PaginationKind {
    /// Page sweep on the default `pageNum` field
    pub fn page_sweep() -> Self {
        PaginationKind::PageSweep {
            page_field: default_page_field(),
        }
    }

    /// Pager-object sweep on the default `pager` field
    pub fn pager_sweep(page_size: u32) -> Self {
        PaginationKind::PagerObjectSweep {
            pager_field: default_pager_field(),
            page_size,
        }
    }

    /// Whether the sweep only stops on a zero-row wave
    pub fn terminates_on_empty_wave(&self) -> bool {
        matches!(
            self,
            PaginationKind::PageSweep { .. } | PaginationKind::PagerObjectSweep { .. }
        )
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            PaginationKind::Single => "single",
            PaginationKind::PageSweep { .. } => "page_sweep",
            PaginationKind::PagerObjectSweep { .. } => "pager_sweep",
            PaginationKind::IdChunkSweep { .. } => "id_chunk_sweep",
        }
    }
}

/// Immutable description of one logical endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    url: String,
    payload_template: Payload,
    kind: PaginationKind,
}

impl RequestDescriptor {
    /// Create a descriptor, rejecting pagination settings that cannot produce payloads
    pub fn new(
        url: impl Into<String>,
        payload_template: Payload,
        kind: PaginationKind,
    ) -> FetchResult<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(FetchError::Config("descriptor URL must not be empty".to_string()));
        }

        match &kind {
            PaginationKind::IdChunkSweep { chunk_size: 0, .. } => {
                return Err(FetchError::Config(format!(
                    "chunk size must be at least 1 for {url}"
                )));
            }
            PaginationKind::IdChunkSweep {
                chunk_size,
                placement: IdPlacement::Scalar { .. },
            } if *chunk_size != 1 => {
                return Err(FetchError::Config(format!(
                    "scalar id placement requires chunk size 1, got {chunk_size} for {url}"
                )));
            }
            PaginationKind::PagerObjectSweep { page_size: 0, .. } => {
                return Err(FetchError::Config(format!(
                    "pager page size must be at least 1 for {url}"
                )));
            }
            _ => {}
        }

        Ok(Self {
            url,
            payload_template,
            kind,
        })
    }

    /// Single-call descriptor
    pub fn single(url: impl Into<String>, payload_template: Payload) -> FetchResult<Self> {
        Self::new(url, payload_template, PaginationKind::Single)
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Payload template every request starts from
    pub fn payload_template(&self) -> &Payload {
        &self.payload_template
    }

    /// Pagination kind
    pub fn kind(&self) -> &PaginationKind {
        &self.kind
    }
}
