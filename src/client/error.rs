use std::time::Duration;

use axum::http::StatusCode;

/// Failure of an outbound call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("http request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("failed to read body: {0}")]
    Body(#[source] axum::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected status code: {}", .0.as_u16())]
    UnexpectedStatus(StatusCode),
}
