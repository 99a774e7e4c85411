//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the process-wide `tracing` subscriber
//! - Redact secrets from payloads before they reach a log line
//!
//! # Design Decisions
//! - JSON format for production, pretty format for development
//! - `RUST_LOG` wins over the configured level when it is set

use std::borrow::Cow;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Replacement written in place of a secret value.
pub const REDACTED: &str = "\"redacted\"";

/// Field names whose values never reach a log line.
pub const SECRET_FIELDS: [&str; 6] = [
    "password",
    "client_id",
    "client_secret",
    "username",
    "access_token",
    "refresh_token",
];

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(config: &ObservabilityConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(&config.log_level))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()?,
    }

    Ok(())
}

fn default_directives(level: &str) -> String {
    let level = level.to_ascii_lowercase();
    format!("service_pipeline={level},tower_http={level},warn")
}

/// Replace the values of known secret fields with [`REDACTED`].
///
/// Handles form-encoded (`password=...&`) and JSON-encoded
/// (`"password": "..."`) bodies. Borrowed when nothing matched.
pub fn sanitize_secrets(input: &str) -> Cow<'_, str> {
    let mut output = Cow::Borrowed(input);
    for field in SECRET_FIELDS {
        if let Some(redacted) = redact_form_field(&output, field) {
            output = Cow::Owned(redacted);
        }
        if let Some(redacted) = redact_json_field(&output, field) {
            output = Cow::Owned(redacted);
        }
    }
    output
}

/// `field=value` up to the next `&` or the end of input.
fn redact_form_field(input: &str, field: &str) -> Option<String> {
    let needle = format!("{field}=");
    if !input.contains(&needle) {
        return None;
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find(&needle) {
        let value_start = pos + needle.len();
        out.push_str(&rest[..value_start]);
        out.push_str(REDACTED);
        let tail = &rest[value_start..];
        rest = match tail.find('&') {
            Some(end) => &tail[end..],
            None => "",
        };
    }
    out.push_str(rest);
    Some(out)
}

/// `"field": "value"` up to the closing quote, honouring escapes.
fn redact_json_field(input: &str, field: &str) -> Option<String> {
    let key = format!("\"{field}\"");
    if !input.contains(&key) {
        return None;
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut changed = false;
    while let Some(pos) = rest.find(&key) {
        let after_key = pos + key.len();
        out.push_str(&rest[..after_key]);
        rest = &rest[after_key..];

        let Some(value_start) = json_string_value_start(rest) else {
            continue;
        };
        let Some(value_len) = json_string_len(&rest[value_start..]) else {
            continue;
        };

        out.push_str(&rest[..value_start - 1]);
        out.push_str(REDACTED);
        rest = &rest[value_start + value_len + 1..];
        changed = true;
    }
    out.push_str(rest);
    changed.then_some(out)
}

/// Offset just past the opening quote of a string value following a key.
fn json_string_value_start(after_key: &str) -> Option<usize> {
    let trimmed = after_key.trim_start();
    let colon = trimmed.strip_prefix(':')?;
    let value = colon.trim_start();
    value.strip_prefix('"')?;
    Some(after_key.len() - value.len() + 1)
}

/// Length of a JSON string body up to (not including) its closing quote.
fn json_string_len(value: &str) -> Option<usize> {
    let mut escaped = false;
    for (idx, ch) in value.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(idx),
            _ => escaped = false,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_password_redacted() {
        let sanitized = sanitize_secrets("password=secret123");
        assert_eq!(sanitized, "password=\"redacted\"");
        assert!(!sanitized.contains("secret123"));
    }

    #[test]
    fn form_fields_keep_neighbours() {
        let sanitized =
            sanitize_secrets("grant_type=password&username=bob&password=hunter2&scope=read");
        assert_eq!(
            sanitized,
            "grant_type=password&username=\"redacted\"&password=\"redacted\"&scope=read"
        );
    }

    #[test]
    fn json_tokens_redacted() {
        let body = r#"{"access_token": "abc.def", "refresh_token":"r\"x", "expires_in": 3600}"#;
        let sanitized = sanitize_secrets(body);
        assert_eq!(
            sanitized,
            r#"{"access_token": "redacted", "refresh_token":"redacted", "expires_in": 3600}"#
        );
        let parsed: serde_json::Value = serde_json::from_str(&sanitized).unwrap();
        assert_eq!(parsed["expires_in"], 3600);
    }

    #[test]
    fn json_non_string_values_untouched() {
        let body = r#"{"username": null, "other": "x"}"#;
        assert_eq!(sanitize_secrets(body), body);
    }

    #[test]
    fn clean_input_is_borrowed() {
        assert!(matches!(sanitize_secrets("a=1&b=2"), Cow::Borrowed(_)));
    }

    #[test]
    fn directives_lowercase_level() {
        assert_eq!(
            default_directives("DEBUG"),
            "service_pipeline=debug,tower_http=debug,warn"
        );
    }
}
