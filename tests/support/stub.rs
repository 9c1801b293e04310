//! Stub reference-data API served by axum on a loopback port

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Password the stub accepts
pub const PASSWORD: &str = "secret";

/// Emitents pages that carry rows; later pages are empty
pub const EMITENT_PAGES: u64 = 3;

/// Rows per non-empty Emitents page
pub const ROWS_PER_PAGE: u64 = 2;

/// Observations made by the stub
#[derive(Default)]
pub struct StubState {
    login_attempts: AtomicUsize,
    logins: AtomicUsize,
    data_calls: AtomicUsize,
    tokens_seen: Mutex<Vec<String>>,
    expire_next: Mutex<bool>,
}

impl StubState {
    /// Login requests, accepted or not
    pub fn login_attempts(&self) -> usize {
        self.login_attempts.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }

    /// Answer the next data call with 401 as if the token expired
    pub fn expire_token(&self) {
        *self.expire_next.lock().unwrap() = true;
    }
}

/// Running stub server
pub struct Stub {
    pub addr: SocketAddr,
    pub state: Arc<StubState>,
}

impl Stub {
    /// Base URL the catalog paths are joined onto
    pub fn base_url(&self) -> String {
        format!("http://{}/v2", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path)
    }
}

/// Bind a stub on 127.0.0.1 and serve it in the background
pub async fn spawn() -> Stub {
    let state = Arc::new(StubState::default());
    let app = Router::new()
        .route("/v2/Account/Login", post(login))
        .route("/v2/Info/Emitents", post(emitents))
        .route("/v2/Rating/CompanyRatingsTable", post(company_ratings))
        .route("/v2/Rating/ListScaleValues", post(scale_values))
        .route("/v2/Broken", post(broken))
        .route("/v2/Garbage", post(garbage))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Stub { addr, state }
}

async fn login(State(state): State<Arc<StubState>>, Json(body): Json<Value>) -> Response {
    state.login_attempts.fetch_add(1, Ordering::SeqCst);
    if body["password"] != json!(PASSWORD) || body["login"].as_str().unwrap_or("").is_empty() {
        return (StatusCode::UNAUTHORIZED, "bad credentials").into_response();
    }
    let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({"token": format!("tok-{n}")})).into_response()
}

/// Record the bearer token, or refuse the call
fn authorize(state: &StubState, headers: &HeaderMap) -> Result<(), Response> {
    state.data_calls.fetch_add(1, Ordering::SeqCst);
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let Some(token) = token else {
        return Err((StatusCode::UNAUTHORIZED, "missing token").into_response());
    };
    state.tokens_seen.lock().unwrap().push(token);

    let mut expire = state.expire_next.lock().unwrap();
    if *expire {
        *expire = false;
        return Err((StatusCode::UNAUTHORIZED, "token expired").into_response());
    }
    Ok(())
}

async fn emitents(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(refused) = authorize(&state, &headers) {
        return refused;
    }
    let page = body["pageNum"].as_u64().unwrap_or_default();
    if page == 0 || page > EMITENT_PAGES {
        return Json(json!([])).into_response();
    }
    let rows: Vec<Value> = (0..ROWS_PER_PAGE)
        .map(|i| json!({"fininstid": page * 10 + i, "shortname_rus": format!("E{page}-{i}")}))
        .collect();
    Json(Value::Array(rows)).into_response()
}

async fn company_ratings(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(refused) = authorize(&state, &headers) {
        return refused;
    }
    let ids = body["ids"][0]["id"].as_array().cloned().unwrap_or_default();
    let rows: Vec<Value> = ids
        .into_iter()
        .map(|id| json!({"fininstid": id, "rating": "ruAA"}))
        .collect();
    Json(Value::Array(rows)).into_response()
}

async fn scale_values(State(state): State<Arc<StubState>>, headers: HeaderMap) -> Response {
    if let Err(refused) = authorize(&state, &headers) {
        return refused;
    }
    Json(json!({"scale": "national", "values": 22})).into_response()
}

async fn broken(State(state): State<Arc<StubState>>, headers: HeaderMap) -> impl IntoResponse {
    let _ = authorize(&state, &headers);
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn garbage(State(state): State<Arc<StubState>>, headers: HeaderMap) -> impl IntoResponse {
    let _ = authorize(&state, &headers);
    (StatusCode::OK, "<html>maintenance</html>")
}
