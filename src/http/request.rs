//! Request-scoped correlation state.
//!
//! # Responsibilities
//! - Reuse the client's `X-Request-ID` or generate one (UUID v4)
//! - Generate a fresh correlation ID for every request
//! - Start the request span under any remote parent and carry its ids
//! - Close the span exactly once with the final status
//!
//! # Design Decisions
//! - Values are fixed at construction; the context is read-only afterwards
//! - Each request gets its own context, passed explicitly through
//!   extensions and into outbound calls

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use opentelemetry::{
    trace::{SpanId, SpanKind, Status, TraceContextExt, TraceId},
    Context, KeyValue,
};
use uuid::Uuid;

use crate::observability::Telemetry;

/// Header carrying the request ID in both directions.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Header carrying the correlation ID on outbound calls.
pub const X_CORRELATION_ID: &str = "x-correlation-id";

#[derive(Debug)]
struct Inner {
    request_id: String,
    generated: bool,
    correlation_id: Uuid,
    trace_id: TraceId,
    span_id: SpanId,
    otel: Context,
    finished: AtomicBool,
}

/// Identifiers attached to a single request for its whole lifetime.
#[derive(Debug, Clone)]
pub struct CorrelationContext {
    inner: Arc<Inner>,
}

impl CorrelationContext {
    /// Derive the context for a request from its headers.
    ///
    /// The span is a child of any trace context found in `headers`, or a
    /// new root when there is none.
    pub fn derive(telemetry: &Telemetry, headers: &HeaderMap, span_name: &str) -> Self {
        let (request_id, generated) = match headers
            .get(X_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
        {
            Some(value) => (value.to_string(), false),
            None => (Uuid::new_v4().to_string(), true),
        };
        let correlation_id = Uuid::new_v4();

        let parent = telemetry.extract(headers);
        let otel = telemetry.start_span(
            span_name,
            SpanKind::Server,
            &parent,
            vec![
                KeyValue::new("request_id", request_id.clone()),
                KeyValue::new("correlation_id", correlation_id.to_string()),
            ],
        );
        let span_context = otel.span().span_context().clone();

        Self {
            inner: Arc::new(Inner {
                request_id,
                generated,
                correlation_id,
                trace_id: span_context.trace_id(),
                span_id: span_context.span_id(),
                otel,
                finished: AtomicBool::new(false),
            }),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    /// Whether the request ID was generated here rather than supplied.
    pub fn request_id_generated(&self) -> bool {
        self.inner.generated
    }

    pub fn correlation_id(&self) -> Uuid {
        self.inner.correlation_id
    }

    pub fn trace_id(&self) -> TraceId {
        self.inner.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.inner.span_id
    }

    /// OpenTelemetry context holding the request span; parent of outbound spans.
    pub fn otel_context(&self) -> &Context {
        &self.inner.otel
    }

    /// End the request span. Error-class statuses (>= 400) mark it errored.
    ///
    /// Returns `false` when the span was already finished.
    pub fn finish(&self, status: StatusCode) -> bool {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return false;
        }

        let span = self.inner.otel.span();
        span.set_attribute(KeyValue::new("http.status_code", i64::from(status.as_u16())));
        if status.as_u16() >= 400 {
            let err = UnsuccessfulRequest(status);
            span.record_error(&err);
            span.set_status(Status::error(err.to_string()));
        }
        span.end();
        true
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }
}

/// Synthetic error attached to spans of error-class responses.
#[derive(Debug, thiserror::Error)]
#[error("unsuccessful api request: {}", .0.as_u16())]
struct UnsuccessfulRequest(StatusCode);

impl<S> FromRequestParts<S> for CorrelationContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CorrelationContext>()
            .cloned()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}
