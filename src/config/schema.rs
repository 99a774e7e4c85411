//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Inbound server settings (timeouts, static docs).
    pub server: ServerConfig,

    /// Logging, metrics and tracing settings.
    pub observability: ObservabilityConfig,

    /// Bearer tokens accepted on authenticated routes.
    pub auth: AuthConfig,

    /// Outbound client settings.
    pub client: ClientConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Inbound server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Upper bound for a single inbound request, in seconds.
    pub request_timeout_secs: u64,

    /// Deadline for draining the exporter and in-flight requests, in seconds.
    pub shutdown_timeout_secs: u64,

    /// Directory served under `/docs`.
    pub docs_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            shutdown_timeout_secs: 10,
            docs_path: "./docs".to_string(),
        }
    }
}

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human readable, multi-line.
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Service name used for the metrics tag, tracer and resource.
    pub service_name: String,

    /// Deployment environment (development, staging, production).
    pub environment: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// OTLP gRPC endpoint. Spans are not exported when unset.
    pub otlp_endpoint: Option<String>,

    /// Ratio of root traces that are sampled.
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "service".to_string(),
            environment: "development".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            otlp_endpoint: None,
            sample_rate: 1.0,
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Accepted bearer tokens.
    pub tokens: Vec<TokenConfig>,
}

/// A bearer token and the subject it authenticates as.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenConfig {
    pub token: String,
    pub subject: String,
}

/// Outbound client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the example upstream.
    pub example_host: String,

    /// API key sent as a bearer token to the example upstream.
    pub example_api_key: String,

    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            example_host: "http://mock-server:8080".to_string(),
            example_api_key: String::new(),
            timeout_secs: 30,
        }
    }
}
