//! Instrumented HTTP service pipeline.
//!
//! An Axum service whose every inbound request passes through a fixed
//! middleware chain, and whose outbound calls pass through a matching tower
//! client chain.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ strip slash ─▶ recover ─▶ [auth] ─▶ trace ─▶ metrics ─▶ access log ─▶ handler
//!                                                                                             │
//!                                                     CorrelationContext (request/correlation │
//!                                                     ids, request span)                      ▼
//!     Downstream  ◀── transport ◀── body logging ◀── client metrics ◀── trace propagation ◀── client
//!
//!     Cross-cutting: config, observability (logs, Prometheus, OTLP), lifecycle (signals, drain)
//! ```

pub mod client;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{Application, ExitStatus};
