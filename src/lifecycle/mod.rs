//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Telemetry → Metrics registry → App state → Router
//!
//! Serve (shutdown.rs):
//!     Bind → Serve ── loop ends early ──→ exit 1
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests + stop exporter → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Shutdown has one deadline for everything: exit 1 when it passes

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{ExitStatus, LifecycleState, ShutdownCoordinator, ShutdownError};
pub use startup::{Application, StartupError};
