//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Environment variables that override file values.
const ENV_BIND_ADDRESS: &str = "REST_API_SERVER_ADDRESS";
const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
const ENV_ENVIRONMENT: &str = "ENVIRONMENT";
const ENV_SERVICE_NAME: &str = "SERVICE_NAME";
const ENV_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
const ENV_EXAMPLE_HOST: &str = "EXAMPLE_HOST";
const ENV_EXAMPLE_API_KEY: &str = "EXAMPLE_API_KEY";

/// Load, apply environment overrides and validate.
///
/// A missing file is not an error: the defaults are used instead.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let mut config = if path.exists() {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        ServiceConfig::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment values on top of the parsed file.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

    if let Some(value) = lookup(ENV_BIND_ADDRESS) {
        config.listener.bind_address = value;
    }
    if let Some(value) = lookup(ENV_LOG_LEVEL) {
        config.observability.log_level = value;
    }
    if let Some(value) = lookup(ENV_ENVIRONMENT) {
        config.observability.environment = value;
    }
    if let Some(value) = lookup(ENV_SERVICE_NAME) {
        config.observability.service_name = value;
    }
    if let Some(value) = lookup(ENV_OTLP_ENDPOINT) {
        config.observability.otlp_endpoint = Some(value);
    }
    if let Some(value) = lookup(ENV_EXAMPLE_HOST) {
        config.client.example_host = value;
    }
    if let Some(value) = lookup(ENV_EXAMPLE_API_KEY) {
        config.client.example_api_key = value;
    }
}
