//! Shutdown coordination.
//!
//! # Responsibilities
//! - Run the serve loop and watch for a termination signal
//! - On signal: stop accepting, drain in-flight requests, stop span export
//! - Bound the whole drain by one deadline and report the exit status
//!
//! # Design Decisions
//! - Server drain and exporter shutdown run concurrently under the same
//!   deadline
//! - A serve loop that ends before any signal is a failure, even when it
//!   returned cleanly

use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::observability::{Telemetry, TelemetryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Draining,
    Stopped,
}

/// How the process ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Signal received and everything drained in time.
    Graceful,
    StartupFailed,
    /// The serve loop ended on its own.
    ServeFailed,
    /// Drain or exporter shutdown failed or missed the deadline.
    ShutdownFailed,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Graceful => 0,
            Self::StartupFailed | Self::ServeFailed | Self::ShutdownFailed => 1,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("span exporter did not stop within {0:?}")]
    ExporterTimeout(Duration),
    #[error("span exporter shutdown failed: {0}")]
    Exporter(#[from] TelemetryError),
    #[error("server did not drain within {0:?}")]
    DrainTimeout(Duration),
    #[error("server failed while draining: {0}")]
    Serve(#[from] io::Error),
    #[error("serve task failed: {0}")]
    Join(#[from] JoinError),
}

/// Drives one serve loop from start to exit.
pub struct ShutdownCoordinator {
    deadline: Duration,
    telemetry: Telemetry,
    state: watch::Sender<LifecycleState>,
}

impl ShutdownCoordinator {
    pub fn new(deadline: Duration, telemetry: Telemetry) -> Self {
        let (state, _) = watch::channel(LifecycleState::Running);
        Self {
            deadline,
            telemetry,
            state,
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Resolves once draining starts.
    pub fn drain_signal(&self) -> BoxFuture<'static, ()> {
        let mut state = self.state.subscribe();
        Box::pin(async move {
            let _ = state
                .wait_for(|state| *state != LifecycleState::Running)
                .await;
        })
    }

    fn transition(&self, next: LifecycleState) {
        self.state.send_replace(next);
        tracing::info!(state = ?next, "lifecycle transition");
    }

    /// Serve until `signal` fires, then drain within the deadline.
    ///
    /// `serve` receives the drain signal and must stop accepting once it
    /// resolves.
    pub async fn run<F, Fut, S>(&self, serve: F, signal: S) -> ExitStatus
    where
        F: FnOnce(BoxFuture<'static, ()>) -> Fut,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
        S: Future<Output = ()>,
    {
        let mut serving = tokio::spawn(serve(self.drain_signal()));

        tokio::select! {
            joined = &mut serving => {
                match joined {
                    Ok(Ok(())) => tracing::error!("serve loop exited before a termination signal"),
                    Ok(Err(err)) => tracing::error!(error = %err, "error occurred while listening to http requests"),
                    Err(err) => tracing::error!(error = %err, "serve task failed"),
                }
                self.transition(LifecycleState::Stopped);
                return ExitStatus::ServeFailed;
            }
            () = signal => {}
        }

        tracing::info!(deadline = ?self.deadline, "graceful shutdown of REST API server");
        self.transition(LifecycleState::Draining);

        let status = match self.drain(&mut serving).await {
            Ok(()) => {
                tracing::info!("shutdown complete");
                ExitStatus::Graceful
            }
            Err(err) => {
                serving.abort();
                tracing::error!(error = %err, "shutdown did not complete successfully");
                ExitStatus::ShutdownFailed
            }
        };
        self.transition(LifecycleState::Stopped);
        status
    }

    async fn drain(&self, serving: &mut JoinHandle<io::Result<()>>) -> Result<(), ShutdownError> {
        let deadline = Instant::now() + self.deadline;

        let exporter = async {
            match tokio::time::timeout_at(deadline, self.telemetry.shutdown()).await {
                Ok(result) => result.map_err(ShutdownError::from),
                Err(_) => Err(ShutdownError::ExporterTimeout(self.deadline)),
            }
        };
        let server = async {
            match tokio::time::timeout_at(deadline, serving).await {
                Ok(joined) => {
                    joined??;
                    Ok::<(), ShutdownError>(())
                }
                Err(_) => Err(ShutdownError::DrainTimeout(self.deadline)),
            }
        };

        let (exporter, server) = tokio::join!(exporter, server);
        if let (Err(exporter), Err(_)) = (&exporter, &server) {
            tracing::error!(error = %exporter, "span exporter shutdown failed");
        }
        server.and(exporter)
    }
}
