//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with every endpoint
//! - Wire up the inbound chain per endpoint group
//! - Bind the server to a listener and serve until drained

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Request, middleware, Router, ServiceExt};
use tokio::net::TcpListener;
use tower::Layer as _;
use tower_http::{
    catch_panic::CatchPanicLayer,
    normalize_path::{NormalizePath, NormalizePathLayer},
    timeout::TimeoutLayer,
};

use crate::client::ExampleClient;
use crate::config::ServiceConfig;
use crate::http::endpoints::{Access, Endpoint};
use crate::http::middleware::{
    access_log, authenticate, record_metrics, recover_panic, trace_request, Authenticator,
    StaticTokenAuthenticator,
};
use crate::observability::{
    MetricsCollector, MetricsError, MetricsRegistry, Telemetry, HTTP_COLLECTOR_METRICS,
};

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub telemetry: Telemetry,
    pub registry: MetricsRegistry,
    pub server_metrics: Arc<MetricsCollector>,
    pub authenticator: Arc<dyn Authenticator>,
    pub example_client: ExampleClient,
}

impl AppState {
    /// Register the server and client collectors and assemble the state.
    pub fn new(
        config: ServiceConfig,
        telemetry: Telemetry,
        registry: MetricsRegistry,
    ) -> Result<Self, MetricsError> {
        let server_metrics = Arc::new(
            registry.collector_with(&config.observability.service_name, &HTTP_COLLECTOR_METRICS)?,
        );
        let example_client = ExampleClient::new(&config.client, &registry, &telemetry)?;
        let authenticator = Arc::new(StaticTokenAuthenticator::new(&config.auth));

        Ok(Self {
            config: Arc::new(config),
            telemetry,
            registry,
            server_metrics,
            authenticator,
            example_client,
        })
    }

    /// Replace the authenticator guarding protected endpoints.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }
}

/// Wrap `router` in the instrumentation links.
///
/// Layers wrap outward: the last one added runs first. The innermost
/// recovery turns a handler panic into a 500 that the links above still
/// trace, count and log; the outer recovery in `build_router` covers panics
/// raised by the links themselves.
fn instrument(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router
        .layer(CatchPanicLayer::custom(recover_panic))
        .layer(middleware::from_fn(access_log))
        .layer(middleware::from_fn_with_state(state.clone(), record_metrics))
        .layer(middleware::from_fn_with_state(state.clone(), trace_request))
}

/// The instrumented service with trailing-slash normalisation in front.
pub type App = NormalizePath<Router>;

/// HTTP server for the instrumented service.
pub struct HttpServer {
    app: App,
}

impl HttpServer {
    pub fn new(state: AppState, endpoints: &[Endpoint]) -> Self {
        let router = Self::build_router(state, endpoints);
        Self {
            app: NormalizePathLayer::trim_trailing_slash().layer(router),
        }
    }

    /// Build the router: the protected group behind authentication, the
    /// public group without it, both under panic recovery and the request
    /// timeout.
    #[allow(deprecated)]
    fn build_router(state: AppState, endpoints: &[Endpoint]) -> Router {
        tracing::debug!(count = endpoints.len(), "registering REST API endpoints");

        let mut protected = Router::new();
        let mut public = Router::new();
        for endpoint in endpoints {
            match endpoint.access() {
                Access::Authenticated => protected = endpoint.register(protected, &state),
                Access::Public => public = endpoint.register(public, &state),
            }
        }

        let protected = instrument(protected, &state)
            .layer(middleware::from_fn_with_state(state.clone(), authenticate));
        let public = instrument(public, &state);

        let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);
        Router::new()
            .merge(protected)
            .merge(public)
            .layer(CatchPanicLayer::custom(recover_panic))
            .layer(TimeoutLayer::new(request_timeout))
            .with_state(state)
    }

    /// A handle on the service, for driving requests without a socket.
    pub fn app(&self) -> App {
        self.app.clone()
    }

    /// Serve connections from `listener` until `shutdown` resolves and
    /// in-flight requests have drained.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let service = ServiceExt::<Request>::into_make_service(self.app);
        axum::serve(listener, service)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
