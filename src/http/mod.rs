//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trailing-slash normalisation, panic recovery)
//!     → middleware/ (authenticate, trace, metrics, access log)
//!     → request.rs (request ID, correlation ID, request span)
//!     → endpoints.rs (handlers)
//!     → response.rs (status and size as actually sent)
//!     → Send to client
//! ```

pub mod endpoints;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use endpoints::{Access, Endpoint};
pub use request::{CorrelationContext, X_CORRELATION_ID, X_REQUEST_ID};
pub use response::{ObserverError, ResponseObserver};
pub use server::{App, AppState, HttpServer};
