//! Panic recovery for the inbound chain.

use std::any::Any;
use std::backtrace::Backtrace;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Turn a handler panic into a bare 500.
///
/// The payload and a stack trace go to the error log; the client sees
/// nothing of either.
pub fn recover_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let stack = Backtrace::force_capture();
    tracing::error!(
        panic = %panic_message(panic.as_ref()),
        stack = %stack,
        "recovered from panic in request handler"
    );
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else {
        "non-string panic payload"
    }
}
