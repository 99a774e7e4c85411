//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;

use service_pipeline::config::{ServiceConfig, TokenConfig};
use service_pipeline::http::{AppState, Endpoint, HttpServer};
use service_pipeline::observability::{MetricsRegistry, Telemetry};

pub const TEST_TOKEN: &str = "test-token";
pub const EXAMPLE_API_KEY: &str = "downstream-key";

/// One request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Default)]
struct BackendState {
    requests: Mutex<Vec<RecordedRequest>>,
    status: AtomicU16,
    delay_ms: AtomicU64,
}

/// Mock downstream service that records every request it receives.
#[derive(Clone)]
pub struct Backend {
    pub addr: SocketAddr,
    state: Arc<BackendState>,
}

impl Backend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState {
            status: AtomicU16::new(200),
            ..BackendState::default()
        });
        let app = Router::new().fallback(record).with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn respond_with(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    pub fn delay(&self, delay: Duration) {
        self.state
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn record(State(state): State<Arc<BackendState>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    });

    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let status = StatusCode::from_u16(state.status.load(Ordering::SeqCst)).unwrap();
    (status, Json(json!({ "id": "msg-1", "access_token": "abc" }))).into_response()
}

/// Defaults with one accepted token and the example client aimed at `backend`.
pub fn test_config(backend: &Backend) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.server.docs_path = "tests/fixtures/docs".into();
    config.auth.tokens.push(TokenConfig {
        token: TEST_TOKEN.into(),
        subject: "tester".into(),
    });
    config.client.example_host = backend.url();
    config.client.example_api_key = EXAMPLE_API_KEY.into();
    config
}

pub fn app_state(config: ServiceConfig) -> AppState {
    let telemetry = Telemetry::disabled(&config.observability.service_name);
    AppState::new(config, telemetry, MetricsRegistry::new().unwrap()).unwrap()
}

/// Serve `state` on an ephemeral port until the test ends.
pub async fn spawn_app(state: AppState) -> SocketAddr {
    let server = HttpServer::new(state, &Endpoint::ALL);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server
            .run(listener, std::future::pending())
            .await
            .unwrap();
    });
    addr
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Value of the first sample named `name` carrying every label fragment.
pub fn sample(rendered: &str, name: &str, labels: &[&str]) -> Option<f64> {
    rendered
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| {
            line.strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
        })
        .find(|line| labels.iter().all(|label| line.contains(label)))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}
