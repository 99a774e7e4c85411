//! Outbound HTTP client subsystem.
//!
//! # Data Flow
//! ```text
//! OutboundRequest::send
//!     → trace.rs (client span, traceparent, X-Request-ID, X-Correlation-ID)
//!     → metrics.rs (count, latency by method/host/status)
//!     → timeout.rs (per-call deadline)
//!     → logging.rs (debug-only redacted body capture)
//!     → transport.rs (hyper connection pool)
//! ```
//!
//! # Design Decisions
//! - Each link is a tower layer; the chain is fixed when the client is built
//! - One collector per client name, registered once
//! - Request context is passed explicitly through request extensions

pub mod error;
pub mod example;
pub mod logging;
pub mod metrics;
pub mod request;
pub mod timeout;
pub mod trace;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Response},
};
use tower::{ServiceBuilder, ServiceExt};

pub use self::error::ClientError;
pub use self::example::{ExampleClient, EXAMPLE_CLIENT_NAME};
pub use self::logging::{BodyLogging, BodyLoggingLayer};
pub use self::metrics::{ClientMetrics, ClientMetricsLayer};
pub use self::request::{OutboundRequest, OutboundResponse, Payload};
pub use self::timeout::{CallTimeout, CallTimeoutLayer};
pub use self::trace::{TracePropagation, TracePropagationLayer};
pub use self::transport::HyperTransport;

use crate::observability::{MetricsError, MetricsRegistry, Telemetry, HTTP_COLLECTOR_METRICS};

/// The full outbound chain, outermost link first.
pub type ClientPipeline =
    TracePropagation<ClientMetrics<CallTimeout<BodyLogging<HyperTransport>>>>;

/// Named, instrumented HTTP client.
#[derive(Clone)]
pub struct HttpClient {
    name: Arc<str>,
    service: ClientPipeline,
}

impl HttpClient {
    /// Build a client and register its collector under `name`.
    pub fn new(
        name: &str,
        registry: &MetricsRegistry,
        telemetry: &Telemetry,
        timeout: Duration,
    ) -> Result<Self, MetricsError> {
        let collector = Arc::new(registry.collector_with(name, &HTTP_COLLECTOR_METRICS)?);
        let service = ServiceBuilder::new()
            .layer(TracePropagationLayer::new(telemetry.clone()))
            .layer(ClientMetricsLayer::new(collector))
            .layer(CallTimeoutLayer::new(name, timeout))
            .layer(BodyLoggingLayer::new(name))
            .service(HyperTransport::new());

        Ok(Self {
            name: Arc::from(name),
            service,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send `req` through the chain, bounded by the client timeout.
    pub async fn execute(&self, req: Request<Body>) -> Result<Response<Body>, ClientError> {
        self.service.clone().oneshot(req).await
    }
}
