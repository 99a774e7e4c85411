//! Access log link.
//!
//! One structured line per request, at a level chosen by status class.

use std::time::Instant;

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::Level;

use crate::http::request::CorrelationContext;
use crate::http::response::ResponseObserver;

/// Status class of a finished request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessClass {
    Informational,
    Success,
    Redirect,
    ClientError,
    ServerError,
}

impl AccessClass {
    pub fn classify(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            300..=399 => Self::Redirect,
            400..=499 => Self::ClientError,
            500.. => Self::ServerError,
            _ => Self::Informational,
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Informational | Self::Success => Level::DEBUG,
            Self::Redirect | Self::ClientError => Level::INFO,
            Self::ServerError => Level::ERROR,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Informational => "Informational response",
            Self::Success => "Successful request",
            Self::Redirect => "Redirected request",
            Self::ClientError => "Invalid client request",
            Self::ServerError => "Internal service error",
        }
    }
}

struct AccessEntry {
    method: String,
    url: String,
    user_agent: String,
    request_id: String,
    correlation_id: String,
    trace_id: String,
    span_id: String,
    status: u16,
    elapsed_ms: f64,
}

macro_rules! access_event {
    ($level:expr, $entry:expr, $message:expr) => {
        tracing::event!(
            $level,
            http_method = %$entry.method,
            http_url = %$entry.url,
            user_agent = %$entry.user_agent,
            request_id = %$entry.request_id,
            correlation_id = %$entry.correlation_id,
            trace_id = %$entry.trace_id,
            span_id = %$entry.span_id,
            http_status = $entry.status,
            response_time_ms = $entry.elapsed_ms,
            "{}",
            $message
        )
    };
}

pub async fn access_log(mut req: Request, next: Next) -> Response {
    let observer = ResponseObserver::attach(&mut req);
    let method = req.method().to_string();
    // Path only: query strings may carry credentials.
    let url = req.uri().path().to_string();
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let ctx = req.extensions().get::<CorrelationContext>().cloned();
    let start = Instant::now();

    let response = observer.observe(next.run(req).await);

    let entry = AccessEntry {
        method,
        url,
        user_agent,
        request_id: ctx.as_ref().map(|c| c.request_id().to_string()).unwrap_or_default(),
        correlation_id: ctx.as_ref().map(|c| c.correlation_id().to_string()).unwrap_or_default(),
        trace_id: ctx.as_ref().map(|c| c.trace_id().to_string()).unwrap_or_default(),
        span_id: ctx.as_ref().map(|c| c.span_id().to_string()).unwrap_or_default(),
        status: observer.code(),
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
    };
    emit(&entry);
    response
}

fn emit(entry: &AccessEntry) {
    let class = AccessClass::classify(entry.status);
    let message = class.message();
    match class {
        AccessClass::ServerError => access_event!(Level::ERROR, entry, message),
        AccessClass::Redirect | AccessClass::ClientError => {
            access_event!(Level::INFO, entry, message)
        }
        AccessClass::Informational | AccessClass::Success => {
            access_event!(Level::DEBUG, entry, message)
        }
    }
}
