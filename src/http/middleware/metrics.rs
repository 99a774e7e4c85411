//! Per-request metrics link.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::http::response::ResponseObserver;
use crate::http::server::AppState;
use crate::observability::HttpMetricLabels;

/// Count the request, then record its latency and outcome under
/// (method, route, status).
pub async fn record_metrics(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let observer = ResponseObserver::attach(&mut req);
    let method = req.method().to_string();
    let url = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    state.server_metrics.record_total();
    let start = Instant::now();

    let response = observer.observe(next.run(req).await);

    let labels = HttpMetricLabels::new(method, url, observer.code());
    state.server_metrics.record_http_latency(start, &labels);
    state.server_metrics.record_http(&labels);
    response
}
