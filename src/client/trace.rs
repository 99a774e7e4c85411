//! Outermost outbound link: client span and context propagation.

use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request, Response},
};
use futures_util::future::BoxFuture;
use opentelemetry::{
    trace::{SpanKind, Status, TraceContextExt},
    KeyValue,
};
use tower::{Layer, Service};

use super::ClientError;
use crate::http::request::{CorrelationContext, X_CORRELATION_ID, X_REQUEST_ID};
use crate::observability::Telemetry;

/// Starts a client span per call and writes the trace context, request ID and
/// correlation ID into the outgoing headers.
///
/// The parent span comes from a [`CorrelationContext`] in the request
/// extensions; without one the call starts a new trace.
#[derive(Clone)]
pub struct TracePropagationLayer {
    telemetry: Telemetry,
}

impl TracePropagationLayer {
    pub fn new(telemetry: Telemetry) -> Self {
        Self { telemetry }
    }
}

impl<S> Layer<S> for TracePropagationLayer {
    type Service = TracePropagation<S>;

    fn layer(&self, service: S) -> Self::Service {
        TracePropagation {
            service,
            telemetry: self.telemetry.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TracePropagation<S> {
    service: S,
    telemetry: Telemetry,
}

impl<S> Service<Request<Body>> for TracePropagation<S>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = ClientError>,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = ClientError;
    type Future = BoxFuture<'static, Result<Response<Body>, ClientError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let correlation = req.extensions().get::<CorrelationContext>().cloned();
        let parent = correlation
            .as_ref()
            .map(|ctx| ctx.otel_context().clone())
            .unwrap_or_default();

        let cx = self.telemetry.start_span(
            format!("HTTP {}", req.method()),
            SpanKind::Client,
            &parent,
            vec![
                KeyValue::new("http.method", req.method().to_string()),
                KeyValue::new("http.url", req.uri().to_string()),
            ],
        );
        self.telemetry.inject(&cx, req.headers_mut());
        if let Some(ctx) = &correlation {
            insert_absent(req.headers_mut(), X_REQUEST_ID, ctx.request_id());
            insert_absent(
                req.headers_mut(),
                X_CORRELATION_ID,
                &ctx.correlation_id().to_string(),
            );
        }

        let future = self.service.call(req);
        Box::pin(async move {
            let result = future.await;
            let span = cx.span();
            match &result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    span.set_attribute(KeyValue::new("http.status_code", i64::from(status)));
                    if status >= 400 {
                        span.set_status(Status::error(format!(
                            "unsuccessful api request: {status}"
                        )));
                    }
                }
                Err(err) => {
                    span.record_error(err);
                    span.set_status(Status::error(err.to_string()));
                }
            }
            span.end();
            result
        })
    }
}

fn insert_absent(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if headers.contains_key(name) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
