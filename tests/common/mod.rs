//! Shared test helpers: a fake aggregator endpoint and staging fixtures.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::post;
use axum::Json;
use instrelay::storage::NewReading;
use instrelay::{SqliteStagingStore, StagingStore, StorageBuilder};
use serde_json::Value;
use tokio::net::TcpListener;

pub const USERNAME: &str = "relay";
pub const PASSWORD: &str = "secret";

/// `Basic base64("relay:secret")`
pub const EXPECTED_AUTH: &str = "Basic cmVsYXk6c2VjcmV0";

/// How the fake aggregator answers.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// 201 with an empty body.
    Created,
    /// 201 with a non-JSON body.
    CreatedWithHtml,
    /// Always the given non-201 status.
    Status(u16),
    /// 201, except the n-th request (1-based) which gets a 500.
    FailRequest(usize),
}

/// One POST as seen by the aggregator.
#[derive(Debug, Clone)]
pub struct Received {
    pub auth: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct AggregatorState {
    behavior: Behavior,
    hits: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Received>>>,
}

/// Handle to a running fake aggregator.
pub struct Aggregator {
    pub url: String,
    hits: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Received>>>,
}

impl Aggregator {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

async fn createlist(
    State(state): State<AggregatorState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    let n = state.hits.fetch_add(1, Ordering::SeqCst) + 1;
    let auth = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let authorized = auth.as_deref() == Some(EXPECTED_AUTH);
    state.received.lock().unwrap().push(Received { auth, body });

    if !authorized {
        return (StatusCode::UNAUTHORIZED, "bad credentials".to_string());
    }

    match state.behavior {
        Behavior::Created => (StatusCode::CREATED, String::new()),
        Behavior::CreatedWithHtml => (StatusCode::CREATED, "<html>created</html>".to_string()),
        Behavior::Status(code) => (
            StatusCode::from_u16(code).unwrap(),
            "not accepted".to_string(),
        ),
        Behavior::FailRequest(fail) if fail == n => {
            (StatusCode::INTERNAL_SERVER_ERROR, "boom".to_string())
        }
        Behavior::FailRequest(_) => (StatusCode::CREATED, String::new()),
    }
}

/// Start a fake aggregator on a random local port.
pub async fn start_aggregator(behavior: Behavior) -> Aggregator {
    let state = AggregatorState {
        behavior,
        hits: Arc::new(AtomicUsize::new(0)),
        received: Arc::new(Mutex::new(Vec::new())),
    };
    let hits = state.hits.clone();
    let received = state.received.clone();

    let router = Router::new()
        .route("/createlist", post(createlist))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Aggregator {
        url: format!("http://{}/createlist", addr),
        hits,
        received,
    }
}

/// URL of a local port nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/createlist", addr)
}

pub async fn memory_store() -> Arc<SqliteStagingStore> {
    Arc::new(
        StorageBuilder::new("sqlite::memory:")
            .build()
            .await
            .expect("Failed to build storage"),
    )
}

/// Stage `n` readings for one instrument, returning their ids in order.
pub async fn stage(store: &SqliteStagingStore, instrument_id: &str, n: usize) -> Vec<i64> {
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let id = store
            .insert(NewReading::new(
                instrument_id,
                "temperature",
                "lab",
                format!("{}.5", 20 + i),
            ))
            .await
            .unwrap();
        ids.push(id);
    }
    ids
}
