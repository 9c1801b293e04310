//! Batch generation for every pagination kind
//!
//! Turns a [`RequestDescriptor`] into a lazy sequence of waves:
//! - Single: one wave with the template as-is
//! - Page sweeps: `limit` consecutive page numbers per wave, never self-terminating
//! - Id-chunk sweeps: `chunk_size * limit` ids per wave, exhaustive and finite
//!
//! Termination of page sweeps is the orchestrator's job (first zero-row wave).

use serde_json::{Map, Value};

use crate::descriptor::{EntityId, IdPlacement, PaginationKind, Payload, RequestDescriptor};
use crate::fetcher::{FetchError, FetchResult};

/// Payloads dispatched concurrently as one wave
pub type Batch = Vec<Payload>;

/// Lazy sequence of waves for one fetch cycle
#[derive(Debug, Clone)]
pub struct Batches {
    template: Payload,
    limit: usize,
    state: BatchState,
}

#[derive(Debug, Clone)]
enum BatchState {
    Single {
        done: bool,
    },
    Pages {
        field: String,
        next_page: u64,
    },
    Pager {
        field: String,
        size: u32,
        next_page: u64,
    },
    Chunks {
        ids: Vec<EntityId>,
        chunk_size: usize,
        placement: IdPlacement,
        offset: usize,
    },
}

/// Build the wave sequence for `descriptor`
///
/// `limit` is the concurrency budget (payloads per wave). `ids` is only consulted by
/// id-chunk sweeps.
///
/// # Errors
/// `EmptyIdSet` when an id-chunk sweep has no ids, `Config` for a zero limit.
pub fn batches(
    descriptor: &RequestDescriptor,
    limit: usize,
    ids: Option<Vec<EntityId>>,
) -> FetchResult<Batches> {
    if limit == 0 {
        return Err(FetchError::Config("concurrency limit must be at least 1".to_string()));
    }

    let state = match descriptor.kind() {
        PaginationKind::Single => single_state(),
        PaginationKind::PageSweep { page_field } => page_state(page_field),
        PaginationKind::PagerObjectSweep {
            pager_field,
            page_size,
        } => pager_state(pager_field, *page_size),
        PaginationKind::IdChunkSweep {
            chunk_size,
            placement,
        } => chunk_state(descriptor.url(), ids, *chunk_size, placement)?,
    };

    Ok(Batches {
        template: descriptor.payload_template().clone(),
        limit,
        state,
    })
}

fn single_state() -> BatchState {
    BatchState::Single { done: false }
}

fn page_state(field: &str) -> BatchState {
    BatchState::Pages {
        field: field.to_string(),
        next_page: 1,
    }
}

fn pager_state(field: &str, size: u32) -> BatchState {
    BatchState::Pager {
        field: field.to_string(),
        size,
        next_page: 1,
    }
}

fn chunk_state(
    url: &str,
    ids: Option<Vec<EntityId>>,
    chunk_size: usize,
    placement: &IdPlacement,
) -> FetchResult<BatchState> {
    let ids = ids.unwrap_or_default();
    if ids.is_empty() {
        return Err(FetchError::EmptyIdSet(url.to_string()));
    }
    Ok(BatchState::Chunks {
        ids,
        chunk_size: chunk_size.max(1),
        placement: placement.clone(),
        offset: 0,
    })
}

impl Batches {
    /// Number of waves left, or `None` for open-ended page sweeps
    pub fn remaining_waves(&self) -> Option<usize> {
        match &self.state {
            BatchState::Single { done } => Some(usize::from(!*done)),
            BatchState::Pages { .. } | BatchState::Pager { .. } => None,
            BatchState::Chunks {
                ids,
                chunk_size,
                offset,
                ..
            } => {
                let left = ids.len().saturating_sub(*offset);
                Some(left.div_ceil(chunk_size * self.limit))
            }
        }
    }
}

impl Iterator for Batches {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let limit = self.limit;
        let template = &self.template;

        match &mut self.state {
            BatchState::Single { done } => {
                if *done {
                    return None;
                }
                *done = true;
                Some(vec![template.clone()])
            }
            BatchState::Pages { field, next_page } => {
                let first = *next_page;
                *next_page += limit as u64;
                Some(
                    (first..first + limit as u64)
                        .map(|page| {
                            let mut payload = template.clone();
                            payload.insert(field.clone(), Value::from(page));
                            payload
                        })
                        .collect(),
                )
            }
            BatchState::Pager {
                field,
                size,
                next_page,
            } => {
                let first = *next_page;
                *next_page += limit as u64;
                Some(
                    (first..first + limit as u64)
                        .map(|page| {
                            let mut pager = Map::new();
                            pager.insert("page".to_string(), Value::from(page));
                            pager.insert("size".to_string(), Value::from(*size));
                            let mut payload = template.clone();
                            payload.insert(field.clone(), Value::Object(pager));
                            payload
                        })
                        .collect(),
                )
            }
            BatchState::Chunks {
                ids,
                chunk_size,
                placement,
                offset,
            } => {
                if *offset >= ids.len() {
                    return None;
                }
                let end = (*offset + *chunk_size * limit).min(ids.len());
                let wave = ids[*offset..end]
                    .chunks(*chunk_size)
                    .map(|chunk| {
                        let mut payload = template.clone();
                        placement.apply(&mut payload, chunk);
                        payload
                    })
                    .collect();
                *offset = end;
                Some(wave)
            }
        }
    }
}
