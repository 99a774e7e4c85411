//! Debug-level capture of outbound payloads.
//!
//! While debug logging is enabled every response body is buffered and logged
//! (redacted), and so are request bodies of non-idempotent calls. Buffered
//! bytes are replayed unchanged, so the peer sees the same request either
//! way. Failed calls are logged at error level whatever the filter.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::{Body, Bytes},
    http::{request::Parts, Method, Request, Response},
};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};
use tracing::Level;

use super::ClientError;
use crate::observability::sanitize_secrets;

#[derive(Clone)]
pub struct BodyLoggingLayer {
    client: Arc<str>,
}

impl BodyLoggingLayer {
    pub fn new(client: &str) -> Self {
        Self {
            client: Arc::from(client),
        }
    }
}

impl<S> Layer<S> for BodyLoggingLayer {
    type Service = BodyLogging<S>;

    fn layer(&self, service: S) -> Self::Service {
        BodyLogging {
            service,
            client: Arc::clone(&self.client),
        }
    }
}

#[derive(Clone)]
pub struct BodyLogging<S> {
    service: S,
    client: Arc<str>,
}

fn debug_enabled() -> bool {
    tracing::enabled!(Level::DEBUG)
}

fn request_capture_enabled(method: &Method) -> bool {
    !method.is_idempotent() && debug_enabled()
}

async fn buffer(body: Body) -> Result<Bytes, ClientError> {
    axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(ClientError::Body)
}

/// What is known about a request once it has been handed on.
struct Sent {
    method: Method,
    host: String,
    path: String,
    body: String,
}

impl Sent {
    fn new(parts: &Parts, body: Option<&Bytes>) -> Self {
        Self {
            method: parts.method.clone(),
            host: parts
                .uri
                .authority()
                .map(|a| a.as_str().to_owned())
                .unwrap_or_default(),
            path: parts.uri.path().to_owned(),
            body: body
                .map(|b| sanitize_secrets(&String::from_utf8_lossy(b)).into_owned())
                .unwrap_or_default(),
        }
    }

    fn failed(&self, client: &str, err: &ClientError) {
        tracing::error!(
            client = %client,
            method = %self.method,
            host = %self.host,
            path = %self.path,
            request_body = %self.body,
            error = %err,
            "request failed with error"
        );
    }
}

impl<S> Service<Request<Body>> for BodyLogging<S>
where
    S: Service<Request<Body>, Response = Response<Body>, Error = ClientError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = ClientError;
    type Future = BoxFuture<'static, Result<Response<Body>, ClientError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Keep the service that was polled ready.
        let clone = self.service.clone();
        let mut service = std::mem::replace(&mut self.service, clone);
        let client = Arc::clone(&self.client);

        if !debug_enabled() {
            return Box::pin(async move {
                let (parts, body) = req.into_parts();
                let sent = Sent::new(&parts, None);
                service
                    .call(Request::from_parts(parts, body))
                    .await
                    .inspect_err(|err| sent.failed(&client, err))
            });
        }

        let capture_request = request_capture_enabled(req.method());
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let (sent, body) = if capture_request {
                let payload = buffer(body).await?;
                (Sent::new(&parts, Some(&payload)), Body::from(payload))
            } else {
                (Sent::new(&parts, None), body)
            };
            tracing::debug!(
                client = %client,
                method = %sent.method,
                host = %sent.host,
                path = %sent.path,
                query = parts.uri.query().unwrap_or_default(),
                request_body = %sent.body,
                "outbound request"
            );

            let response = service
                .call(Request::from_parts(parts, body))
                .await
                .inspect_err(|err| sent.failed(&client, err))?;

            let (parts, body) = response.into_parts();
            let payload = buffer(body)
                .await
                .inspect_err(|err| sent.failed(&client, err))?;
            tracing::debug!(
                client = %client,
                status = parts.status.as_u16(),
                response_body = %sanitize_secrets(&String::from_utf8_lossy(&payload)),
                "outbound response"
            );
            Ok(Response::from_parts(parts, Body::from(payload)))
        })
    }
}
