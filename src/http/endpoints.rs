//! Service endpoints.
//!
//! Each [`Endpoint`] knows its route, whether it needs authentication, and how
//! to register itself on a router.

use std::path::Path;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tower_http::services::ServeDir;

use crate::http::middleware::Identity;
use crate::http::request::CorrelationContext;
use crate::http::server::AppState;

/// Prometheus text exposition format.
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Index,
    Status,
    Docs,
    Metrics,
    Example,
}

impl Endpoint {
    /// Every endpoint the service ships.
    pub const ALL: [Endpoint; 5] = [
        Endpoint::Index,
        Endpoint::Status,
        Endpoint::Docs,
        Endpoint::Metrics,
        Endpoint::Example,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Self::Index => "/",
            Self::Status => "/status",
            Self::Docs => "/docs",
            Self::Metrics => "/metrics",
            Self::Example => "/example-endpoint",
        }
    }

    pub fn access(self) -> Access {
        match self {
            Self::Example => Access::Authenticated,
            _ => Access::Public,
        }
    }

    pub(crate) fn register(self, router: Router<AppState>, state: &AppState) -> Router<AppState> {
        match self {
            Self::Index => router.route(self.path(), get(index)),
            Self::Status => router.route(self.path(), get(status)),
            Self::Metrics => router.route(self.path(), get(metrics)),
            Self::Example => router.route(self.path(), get(example)),
            Self::Docs => register_docs(router, &state.config.server.docs_path),
        }
    }
}

fn register_docs(router: Router<AppState>, docs_path: &str) -> Router<AppState> {
    if Path::new(docs_path).is_dir() {
        return router.nest_service(Endpoint::Docs.path(), ServeDir::new(docs_path));
    }

    tracing::error!(path = %docs_path, "failed to fetch api docs: directory not found");
    let missing = format!("docs directory {docs_path} not found");
    let handler = move || {
        let missing = missing.clone();
        async move { internal_error(missing) }
    };
    router
        .route(Endpoint::Docs.path(), any(handler.clone()))
        .route("/docs/{*path}", any(handler))
}

fn internal_error(message: impl Into<String>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message.into() })),
    )
        .into_response()
}

async fn index(State(state): State<AppState>) -> Json<Value> {
    tracing::debug!("index endpoint hit");
    let mut body = Map::new();
    body.insert(
        state.telemetry.service_name().to_string(),
        Value::from("online"),
    );
    Json(Value::Object(body))
}

async fn status() -> Json<Value> {
    Json(json!({ "status": "up" }))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        state.registry.render(),
    )
}

async fn example(
    State(state): State<AppState>,
    ctx: CorrelationContext,
    identity: Identity,
) -> Response {
    tracing::debug!(subject = %identity.subject(), request_id = %ctx.request_id(), "example endpoint hit");

    if let Err(err) = state.example_client.external_request(&ctx).await {
        tracing::error!(error = %err, request_id = %ctx.request_id(), "failed to make external request");
        return internal_error(err.to_string());
    }
    Json(json!({ "message": "example endpoint hit" })).into_response()
}
