//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order: telemetry, metrics, state
//! - Bind the listener and hand the serve loop to the shutdown coordinator
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds last, inside the serve loop, so a bind failure is a
//!   serve failure

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::ServiceConfig;
use crate::http::{AppState, Endpoint, HttpServer};
use crate::lifecycle::shutdown::{ExitStatus, ShutdownCoordinator};
use crate::observability::{MetricsError, MetricsRegistry, Telemetry, TelemetryError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to initialise tracing: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to register metrics: {0}")]
    Metrics(#[from] MetricsError),
}

/// A fully wired service, ready to serve.
pub struct Application {
    server: HttpServer,
    telemetry: Telemetry,
    bind_address: String,
    shutdown_timeout: Duration,
}

impl Application {
    /// Build every subsystem from `config`.
    ///
    /// Must run inside a Tokio runtime when span export is configured.
    pub fn build(config: ServiceConfig) -> Result<Self, StartupError> {
        let telemetry = Telemetry::new(&config.observability)?;
        let registry = MetricsRegistry::new()?;

        let bind_address = config.listener.bind_address.clone();
        let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);

        let state = AppState::new(config, telemetry.clone(), registry)?;
        let server = HttpServer::new(state, &Endpoint::ALL);

        tracing::info!(
            service = %telemetry.service_name(),
            bind = %bind_address,
            "service initialised"
        );
        Ok(Self {
            server,
            telemetry,
            bind_address,
            shutdown_timeout,
        })
    }

    /// Bind the configured address and serve until `signal`.
    pub async fn run_until<S>(self, signal: S) -> ExitStatus
    where
        S: Future<Output = ()>,
    {
        let coordinator = ShutdownCoordinator::new(self.shutdown_timeout, self.telemetry);
        let address = self.bind_address;
        let server = self.server;

        coordinator
            .run(
                move |drain| async move {
                    let listener = TcpListener::bind(&address).await?;
                    server.run(listener, drain).await
                },
                signal,
            )
            .await
    }

    /// Serve on an already bound listener until `signal`.
    pub async fn serve_until<S>(self, listener: TcpListener, signal: S) -> ExitStatus
    where
        S: Future<Output = ()>,
    {
        let coordinator = ShutdownCoordinator::new(self.shutdown_timeout, self.telemetry);
        let server = self.server;

        coordinator
            .run(move |drain| server.run(listener, drain), signal)
            .await
    }
}
