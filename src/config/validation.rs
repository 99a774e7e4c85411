//! Configuration validation.
//!
//! Serde handles the syntactic checks; this pass covers value ranges and
//! cross-field rules. Every violation is collected, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

/// Known deployment environments.
pub const ENVIRONMENTS: [&str; 3] = ["development", "staging", "production"];

/// Known log levels.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic configuration error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),
    #[error("observability.service_name must not be empty")]
    EmptyServiceName,
    #[error("observability.environment `{0}` is unknown")]
    UnknownEnvironment(String),
    #[error("observability.log_level `{0}` is unknown")]
    UnknownLogLevel(String),
    #[error("observability.sample_rate {0} is outside [0, 1]")]
    SampleRate(f64),
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("client.example_host `{0}` is not an absolute http URL")]
    ExampleHost(String),
    #[error("auth token for subject `{0}` is empty")]
    EmptyToken(String),
    #[error("auth token for subject `{0}` is configured twice")]
    DuplicateToken(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let obs = &config.observability;
    if obs.service_name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }
    if !ENVIRONMENTS.contains(&obs.environment.as_str()) {
        errors.push(ValidationError::UnknownEnvironment(obs.environment.clone()));
    }
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(obs.log_level.clone()));
    }
    if !(0.0..=1.0).contains(&obs.sample_rate) {
        errors.push(ValidationError::SampleRate(obs.sample_rate));
    }

    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("server.request_timeout_secs"));
    }
    if config.server.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("server.shutdown_timeout_secs"));
    }
    if config.client.timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("client.timeout_secs"));
    }

    // The outbound transport speaks plain HTTP only.
    match url::Url::parse(&config.client.example_host) {
        Ok(url) if url.scheme() == "http" && url.has_host() => {}
        _ => errors.push(ValidationError::ExampleHost(config.client.example_host.clone())),
    }

    let mut seen = HashSet::new();
    for entry in &config.auth.tokens {
        if entry.token.is_empty() {
            errors.push(ValidationError::EmptyToken(entry.subject.clone()));
        } else if !seen.insert(entry.token.as_str()) {
            errors.push(ValidationError::DuplicateToken(entry.subject.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
