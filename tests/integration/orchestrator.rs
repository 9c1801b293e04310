//! Integration tests for the fetch cycle: waves, termination, retry layers, rate limit

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use refdata_harvester::descriptor::{EntityId, IdPlacement, PaginationKind, RequestDescriptor};
use refdata_harvester::fetcher::token::TokenManager;
use refdata_harvester::fetcher::FetchError;
use refdata_harvester::orchestrator::config::DEFAULT_LIMIT;
use refdata_harvester::orchestrator::{RateLimiter, RequestOrchestrator};

use crate::support::{
    fast_config, limited_orchestrator, orchestrator, page_of, payload, RejectingAuth, ScriptedTransport, Step,
};

const URL: &str = "http://api.test/v2/Info/Emitents";

fn page_sweep() -> RequestDescriptor {
    RequestDescriptor::new(URL, payload(json!({"pageSize": 300})), PaginationKind::page_sweep())
        .unwrap()
}

fn id_sweep(chunk_size: usize) -> RequestDescriptor {
    RequestDescriptor::new(
        URL,
        payload(json!({"date": "2024-09-30"})),
        PaginationKind::IdChunkSweep {
            chunk_size,
            placement: IdPlacement::List {
                field: "ids".to_string(),
            },
        },
    )
    .unwrap()
}

fn single() -> RequestDescriptor {
    RequestDescriptor::single(URL, payload(json!({"filter": ""}))).unwrap()
}

fn ids(n: i64) -> Option<Vec<EntityId>> {
    Some((0..n).map(EntityId::Int).collect())
}

fn chunk_len(p: &refdata_harvester::descriptor::Payload) -> usize {
    p["ids"].as_array().map(Vec::len).unwrap_or_default()
}

// Page sweeps

#[tokio::test]
async fn test_page_sweep_seven_full_pages_takes_two_waves() {
    let transport = ScriptedTransport::new(|p| {
        if page_of(p) <= 7 {
            Step::Rows(10)
        } else {
            Step::Rows(0)
        }
    });
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&page_sweep(), None).await.unwrap();

    assert_eq!(rows.len(), 70);
    assert_eq!(transport.calls(), 10, "pages 1-5 then 6-10, nothing after");
    let mut pages: Vec<u64> = transport.payloads().iter().map(page_of).collect();
    pages.sort_unstable();
    assert_eq!(pages, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_page_sweep_stops_on_first_empty_wave() {
    let transport = ScriptedTransport::new(|_| Step::Rows(0));
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&page_sweep(), None).await.unwrap();

    assert!(rows.is_empty());
    assert_eq!(transport.calls(), 5);
}

#[tokio::test]
async fn test_degraded_page_does_not_end_sweep() {
    let transport = ScriptedTransport::new(|p| match page_of(p) {
        3 => Step::Status(500),
        1..=10 => Step::Rows(10),
        _ => Step::Rows(0),
    });
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&page_sweep(), None).await.unwrap();

    assert_eq!(rows.len(), 90, "page 3 degraded, pages 1-2 and 4-10 kept");
    assert_eq!(transport.calls(), 15);
}

#[tokio::test]
async fn test_pager_object_sweep() {
    let descriptor = RequestDescriptor::new(
        URL,
        payload(json!({"id": "", "fields": [], "filter": ""})),
        PaginationKind::pager_sweep(300),
    )
    .unwrap();
    let transport = ScriptedTransport::new(|p| {
        let page = p["pager"]["page"].as_u64().unwrap_or_default();
        assert_eq!(p["pager"]["size"], json!(300));
        if page <= 3 {
            Step::Rows(300)
        } else {
            Step::Rows(0)
        }
    });
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&descriptor, None).await.unwrap();

    assert_eq!(rows.len(), 900);
    assert_eq!(transport.calls(), 5);
}

#[tokio::test]
async fn test_runaway_sweep_overflows() {
    let transport = ScriptedTransport::new(|_| Step::Rows(1));
    let (orch, _, _) = orchestrator(transport.clone(), fast_config().with_max_waves(3));

    let err = orch.fetch_all(&page_sweep(), None).await.unwrap_err();

    assert!(matches!(err, FetchError::PaginationOverflow { waves: 3, .. }));
    assert_eq!(transport.calls(), 15, "fatal, so no cycle restart");
}

// Id chunk sweeps

#[tokio::test]
async fn test_id_sweep_250_ids_one_wave_of_three() {
    let transport = ScriptedTransport::new(|_| Step::Rows(1));
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&id_sweep(100), ids(250)).await.unwrap();

    assert_eq!(rows.len(), 3);
    let mut sizes: Vec<usize> = transport.payloads().iter().map(chunk_len).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![50, 100, 100]);
}

#[tokio::test]
async fn test_id_sweep_is_exhaustive_despite_empty_chunks() {
    let transport = ScriptedTransport::new(|_| Step::Rows(0));
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&id_sweep(10), ids(120)).await.unwrap();

    assert!(rows.is_empty());
    assert_eq!(transport.calls(), 12, "zero-row waves never end an id sweep");
}

#[tokio::test]
async fn test_http_500_on_one_call_of_five() {
    let transport = ScriptedTransport::new(|p| {
        if p["ids"][0] == json!(200) {
            Step::Status(500)
        } else {
            Step::Rows(7)
        }
    });
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&id_sweep(100), ids(500)).await.unwrap();

    assert_eq!(rows.len(), 28);
    assert_eq!(transport.calls(), 5, "non-2xx is not retried");
}

#[tokio::test]
async fn test_missing_ids_are_fatal() {
    let transport = ScriptedTransport::new(|_| Step::Rows(1));
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let err = orch.fetch_all(&id_sweep(100), None).await.unwrap_err();
    assert!(matches!(err, FetchError::EmptyIdSet(_)));

    let err = orch.fetch_all(&id_sweep(100), Some(Vec::new())).await.unwrap_err();
    assert!(matches!(err, FetchError::EmptyIdSet(_)));
    assert_eq!(transport.calls(), 0);
}

// Retry layers

#[tokio::test]
async fn test_always_failing_transport_exhausts_after_fifteen_attempts() {
    let transport = ScriptedTransport::new(|_| {
        Step::Fail(FetchError::ConnectionFailure("connection refused".to_string()))
    });
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let err = orch.fetch_all(&single(), None).await.unwrap_err();

    match err {
        FetchError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, FetchError::ConnectionFailure(_)));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(transport.calls(), 15);
}

#[tokio::test]
async fn test_transient_failure_recovered_by_wave_layer() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = attempts.clone();
    let transport = ScriptedTransport::new(move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) < 2 {
            Step::Fail(FetchError::TimeoutFailure("read timed out".to_string()))
        } else {
            Step::Rows(4)
        }
    });
    let (orch, auth, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&single(), None).await.unwrap();

    assert_eq!(rows.len(), 4);
    assert_eq!(transport.calls(), 3);
    assert_eq!(auth.logins(), 1, "wave retries reuse the token");
}

#[tokio::test]
async fn test_failed_wave_appends_nothing() {
    let page_seven = Arc::new(AtomicUsize::new(0));
    let seen = page_seven.clone();
    let transport = ScriptedTransport::new(move |p| match page_of(p) {
        7 if seen.fetch_add(1, Ordering::SeqCst) == 0 => {
            Step::Fail(FetchError::ConnectionFailure("reset by peer".to_string()))
        }
        1..=7 => Step::Rows(10),
        _ => Step::Rows(0),
    });
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&page_sweep(), None).await.unwrap();

    assert_eq!(rows.len(), 70, "rows of the failed attempt are not duplicated");
    assert_eq!(transport.calls(), 15, "wave 2 dispatched twice");
}

#[tokio::test]
async fn test_parse_error_restarts_whole_cycle() {
    let wave_two = Arc::new(AtomicUsize::new(0));
    let seen = wave_two.clone();
    let transport = ScriptedTransport::new(move |p| match page_of(p) {
        6 if seen.fetch_add(1, Ordering::SeqCst) == 0 => {
            Step::Fail(FetchError::Parse("expected value at line 1".to_string()))
        }
        1..=7 => Step::Rows(10),
        _ => Step::Rows(0),
    });
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&page_sweep(), None).await.unwrap();

    assert_eq!(rows.len(), 70, "restart begins from an empty result");
    assert_eq!(transport.calls(), 20);
}

#[tokio::test]
async fn test_auth_failure_is_fatal() {
    let transport = ScriptedTransport::new(|_| Step::Rows(1));
    let tokens = Arc::new(TokenManager::new(Arc::new(RejectingAuth)));
    let config = fast_config();
    let orch = RequestOrchestrator::new(
        transport.clone(),
        tokens,
        RateLimiter::new(DEFAULT_LIMIT),
        config,
    );

    let err = orch.fetch_all(&single(), None).await.unwrap_err();

    assert!(matches!(err, FetchError::AuthFailure(_)));
    assert_eq!(transport.calls(), 0);
}

// Tokens

#[tokio::test]
async fn test_token_obtained_once_per_run() {
    let transport = ScriptedTransport::new(|p| {
        if page_of(p) <= 12 {
            Step::Rows(3)
        } else {
            Step::Rows(0)
        }
    });
    let (orch, auth, _) = orchestrator(transport.clone(), fast_config());

    orch.fetch_all(&page_sweep(), None).await.unwrap();
    orch.fetch_all(&single(), None).await.unwrap();

    assert_eq!(auth.logins(), 1);
}

#[tokio::test]
async fn test_unauthorized_response_invalidates_token() {
    let transport = ScriptedTransport::new(|_| Step::Status(401));
    let (orch, auth, tokens) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&single(), None).await.unwrap();
    assert!(rows.is_empty());
    assert!(!tokens.has_token().await);

    orch.fetch_all(&single(), None).await.unwrap();
    assert_eq!(auth.logins(), 2);
}

// Concurrency

#[tokio::test]
async fn test_in_flight_never_exceeds_limit() {
    let transport = ScriptedTransport::with_latency(Duration::from_millis(5), |_| Step::Rows(1));
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&id_sweep(10), ids(1_000)).await.unwrap();

    assert_eq!(rows.len(), 100);
    assert!(transport.peak_in_flight() <= 5);
    assert_eq!(orch.limiter().available(), 5);
}

#[tokio::test]
async fn test_wave_size_follows_limiter() {
    let script = |p: &refdata_harvester::descriptor::Payload| {
        if page_of(p) <= 4 {
            Step::Rows(10)
        } else {
            Step::Rows(0)
        }
    };

    // Pages 1-5 in one wave; page 5 is empty
    let transport = ScriptedTransport::new(script);
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());
    assert_eq!(orch.fetch_all(&page_sweep(), None).await.unwrap().len(), 40);
    assert_eq!(transport.calls(), 5);

    // Pages 1-3, then 4-6
    let transport = ScriptedTransport::new(script);
    let (orch, _, _) = limited_orchestrator(transport.clone(), fast_config(), 3);
    assert_eq!(orch.fetch_all(&page_sweep(), None).await.unwrap().len(), 40);
    assert_eq!(transport.calls(), 6);
    assert!(transport.peak_in_flight() <= 3);
}

#[tokio::test]
async fn test_shared_limiter_bounds_concurrent_orchestrators() {
    let transport = ScriptedTransport::with_latency(Duration::from_millis(5), |_| Step::Rows(1));
    let limiter = RateLimiter::new(5);
    let build = || {
        let config = fast_config();
        let tokens = Arc::new(TokenManager::new(Arc::new(
            crate::support::CountingAuth::default(),
        )));
        RequestOrchestrator::new(transport.clone(), tokens, limiter.clone(), config)
    };
    let (first, second) = (build(), build());

    let descriptor = id_sweep(10);
    let (a, b) = tokio::join!(
        first.fetch_all(&descriptor, ids(300)),
        second.fetch_all(&descriptor, ids(300)),
    );

    assert_eq!(a.unwrap().len() + b.unwrap().len(), 60);
    assert!(transport.peak_in_flight() <= 5);
}

#[tokio::test(start_paused = true)]
async fn test_per_call_timeout_drops_only_that_call() {
    let transport = ScriptedTransport::new(|p| {
        if p["ids"][0] == json!(0) {
            Step::Hang
        } else {
            Step::Rows(2)
        }
    });
    let (orch, _, _) = orchestrator(transport.clone(), fast_config());

    let rows = orch.fetch_all(&id_sweep(1), ids(5)).await.unwrap();

    assert_eq!(rows.len(), 8);
    assert_eq!(transport.calls(), 5, "a timeout is not retried");
    assert_eq!(orch.limiter().available(), 5, "permit released on timeout");
}
