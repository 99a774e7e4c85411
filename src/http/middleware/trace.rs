//! Correlation and span link.
//!
//! Derives the [`CorrelationContext`] for every request, makes it visible to
//! the rest of the chain and closes the request span with the final status.

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::request::{CorrelationContext, X_REQUEST_ID};
use crate::http::response::ResponseObserver;
use crate::http::server::AppState;

pub async fn trace_request(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let observer = ResponseObserver::attach(&mut req);
    let span_name = format!("{} {}", req.method(), req.uri().path());
    let ctx = CorrelationContext::derive(&state.telemetry, req.headers(), &span_name);
    let request_id = HeaderValue::from_str(ctx.request_id()).ok();

    if ctx.request_id_generated() {
        if let Some(value) = &request_id {
            req.headers_mut().insert(X_REQUEST_ID, value.clone());
        }
    }
    req.extensions_mut().insert(ctx.clone());

    let mut response = observer.observe(next.run(req).await);
    ctx.finish(observer.status().unwrap_or(StatusCode::OK));

    if let Some(value) = request_id {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}
