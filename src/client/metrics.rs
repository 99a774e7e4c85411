//! Outbound call metrics, labelled by method, host and status.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, Response},
};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use super::ClientError;
use crate::observability::{HttpMetricLabels, MetricsCollector};

#[derive(Clone)]
pub struct ClientMetricsLayer {
    collector: Arc<MetricsCollector>,
}

impl ClientMetricsLayer {
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

impl<S> Layer<S> for ClientMetricsLayer {
    type Service = ClientMetrics<S>;

    fn layer(&self, service: S) -> Self::Service {
        ClientMetrics {
            service,
            collector: Arc::clone(&self.collector),
        }
    }
}

#[derive(Clone)]
pub struct ClientMetrics<S> {
    service: S,
    collector: Arc<MetricsCollector>,
}

impl<S> Service<Request<Body>> for ClientMetrics<S>
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
        let method = req.method().to_string();
        let host = req
            .uri()
            .authority()
            .map(|authority| authority.as_str().to_owned())
            .unwrap_or_default();
        let collector = Arc::clone(&self.collector);

        collector.record_total();
        let start = Instant::now();
        let future = self.service.call(req);

        Box::pin(async move {
            let result = future.await;
            match &result {
                Ok(response) => {
                    let labels = HttpMetricLabels::new(method, host, response.status().as_u16());
                    collector.record_http(&labels);
                    collector.record_http_latency(start, &labels);
                }
                Err(_) => {
                    // Status 0: the call never produced a response.
                    collector.record_error();
                    collector.record_http_latency(start, &HttpMetricLabels::new(method, host, 0));
                }
            }
            result
        })
    }
}
