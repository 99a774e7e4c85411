//! Inbound middleware chain.
//!
//! # Order
//! ```text
//! strip trailing slash → recover → [authenticate] → trace → metrics → access log → handler
//! ```
//!
//! Every link shares the request's [`ResponseObserver`](crate::http::response::ResponseObserver),
//! so status and size are the ones actually sent.

pub mod access_log;
pub mod auth;
pub mod metrics;
pub mod recover;
pub mod trace;

pub use access_log::access_log;
pub use auth::{authenticate, AuthError, Authenticator, Identity, StaticTokenAuthenticator};
pub use metrics::record_metrics;
pub use recover::recover_panic;
pub use trace::trace_request;
