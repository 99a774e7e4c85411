//! Per-call deadline for outbound requests.
//!
//! Sits below the metrics and trace links so an expired call comes back
//! out through them as [`ClientError::Timeout`].

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Response},
};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use super::ClientError;

#[derive(Clone)]
pub struct CallTimeoutLayer {
    client: Arc<str>,
    timeout: Duration,
}

impl CallTimeoutLayer {
    pub fn new(client: &str, timeout: Duration) -> Self {
        Self {
            client: Arc::from(client),
            timeout,
        }
    }
}

impl<S> Layer<S> for CallTimeoutLayer {
    type Service = CallTimeout<S>;

    fn layer(&self, service: S) -> Self::Service {
        CallTimeout {
            service,
            client: Arc::clone(&self.client),
            timeout: self.timeout,
        }
    }
}

#[derive(Clone)]
pub struct CallTimeout<S> {
    service: S,
    client: Arc<str>,
    timeout: Duration,
}

impl<S> Service<Request<Body>> for CallTimeout<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let client = Arc::clone(&self.client);
        let timeout = self.timeout;
        let future = self.service.call(req);

        Box::pin(async move {
            match tokio::time::timeout(timeout, future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(client = %client, timeout = ?timeout, "outbound call timed out");
                    Err(ClientError::Timeout(timeout))
                }
            }
        })
    }
}
