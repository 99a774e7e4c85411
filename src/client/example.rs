//! Client for the example downstream service.

use std::time::Duration;

use axum::http::{header, Method};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error};

use super::{ClientError, HttpClient, OutboundRequest, Payload};
use crate::config::ClientConfig;
use crate::http::request::CorrelationContext;
use crate::observability::{sanitize_secrets, MetricsError, MetricsRegistry, Telemetry};

/// Collector tag of the example client.
pub const EXAMPLE_CLIENT_NAME: &str = "example.client";

/// Statuses at or above this are failures for the example service.
const FIRST_UNEXPECTED_STATUS: u16 = 226;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExampleMessage {
    event_type: String,
    payload: serde_json::Value,
}

#[derive(Clone)]
pub struct ExampleClient {
    http: HttpClient,
    host: String,
    api_key: String,
}

impl ExampleClient {
    pub fn new(
        config: &ClientConfig,
        registry: &MetricsRegistry,
        telemetry: &Telemetry,
    ) -> Result<Self, MetricsError> {
        let http = HttpClient::new(
            EXAMPLE_CLIENT_NAME,
            registry,
            telemetry,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(Self {
            http,
            host: config.example_host.trim_end_matches('/').to_string(),
            api_key: config.example_api_key.clone(),
        })
    }

    /// Create a message on the example service on behalf of the request in `ctx`.
    pub async fn external_request(&self, ctx: &CorrelationContext) -> Result<(), ClientError> {
        let message = ExampleMessage {
            event_type: String::new(),
            payload: json!({ "key": "value" }),
        };
        let request = OutboundRequest::new(
            Method::POST,
            format!("{}/api/v1", self.host),
            Payload::json(&message)?,
        )
        .header(header::AUTHORIZATION.as_str(), format!("Bearer {}", self.api_key));

        debug!(
            request_id = %ctx.request_id(),
            correlation_id = %ctx.correlation_id(),
            host = %self.host,
            "sending http request to example service"
        );

        let response = request.send(&self.http, Some(ctx)).await.map_err(|err| {
            error!(error = %err, "http request to create message failed");
            err
        })?;

        debug!(
            status = response.status.as_u16(),
            body = %sanitize_secrets(&String::from_utf8_lossy(&response.body)),
            "http response from example service"
        );

        if response.status.as_u16() >= FIRST_UNEXPECTED_STATUS {
            return Err(ClientError::UnexpectedStatus(response.status));
        }
        Ok(())
    }
}
