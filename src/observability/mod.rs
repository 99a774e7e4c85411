//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound chain and outbound clients produce:
//!     → logging.rs (structured log events, redacted payloads)
//!     → metrics.rs (counters, histograms per collector)
//!     → tracing.rs (spans with request/correlation ids)
//!
//! Consumers:
//!     → stdout (JSON or pretty)
//!     → /metrics endpoint (Prometheus scrape)
//!     → OTLP collector (optional)
//! ```
//!
//! # Design Decisions
//! - Registry and telemetry are built at startup and passed down
//! - Request ID and correlation ID flow through every log line of a request
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use self::logging::sanitize_secrets;
pub use self::metrics::{
    CollectorMetric, HttpMetricLabels, MetricKind, MetricsCollector, MetricsError,
    MetricsRegistry, HTTP_COLLECTOR_METRICS,
};
pub use self::tracing::{Telemetry, TelemetryError};
