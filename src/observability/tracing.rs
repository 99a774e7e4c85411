//! Distributed tracing support.
//!
//! # Responsibilities
//! - Build the tracer provider (OTLP batch export or local-only)
//! - Extract trace context from incoming request headers
//! - Inject trace context into outbound request headers
//! - Flush and stop the provider during shutdown
//!
//! # Design Decisions
//! - W3C Trace Context headers (`traceparent`, `tracestate`)
//! - The propagator is owned by [`Telemetry`], not installed globally
//! - Without an endpoint spans still get ids; nothing is exported

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::{
    global,
    propagation::{Extractor, Injector, TextMapPropagator},
    trace::{SpanKind, TraceContextExt, TraceError, Tracer as _, TracerProvider as _},
    Context, KeyValue,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    runtime,
    trace::{Config, Sampler, Tracer, TracerProvider},
    Resource,
};

use crate::config::ObservabilityConfig;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to install trace pipeline: {0}")]
    Install(#[from] TraceError),
    #[error("failed to flush spans: {0}")]
    Flush(String),
    #[error("telemetry shutdown task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Where finished spans go.
enum Export {
    /// Batch exporter installed as the process tracer provider.
    Otlp,
    /// Provider owned here, no exporter attached.
    Local(TracerProvider),
}

struct Inner {
    service_name: String,
    tracer: Tracer,
    export: Export,
    propagator: TraceContextPropagator,
}

/// Tracer, propagator and exporter lifecycle for one service.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

impl Telemetry {
    /// Build tracing from configuration.
    pub fn new(config: &ObservabilityConfig) -> Result<Self, TelemetryError> {
        let trace_config = Config::default()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                config.sample_rate,
            ))))
            .with_resource(resource(config));

        let Some(endpoint) = &config.otlp_endpoint else {
            return Ok(Self::local(&config.service_name, trace_config));
        };

        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint.clone()),
            )
            .with_trace_config(trace_config)
            .install_batch(runtime::Tokio)?;

        tracing::info!(endpoint = %endpoint, "span export enabled");
        Ok(Self::from_parts(&config.service_name, tracer, Export::Otlp))
    }

    /// Local provider that samples everything and exports nothing.
    pub fn disabled(service_name: &str) -> Self {
        Self::local(
            service_name,
            Config::default().with_sampler(Sampler::AlwaysOn),
        )
    }

    fn local(service_name: &str, trace_config: Config) -> Self {
        let provider = TracerProvider::builder().with_config(trace_config).build();
        let tracer = provider.tracer(service_name.to_string());
        Self::from_parts(service_name, tracer, Export::Local(provider))
    }

    fn from_parts(service_name: &str, tracer: Tracer, export: Export) -> Self {
        Self {
            inner: Arc::new(Inner {
                service_name: service_name.to_string(),
                tracer,
                export,
                propagator: TraceContextPropagator::new(),
            }),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    /// Remote parent context carried by `headers`, if any.
    pub fn extract(&self, headers: &HeaderMap) -> Context {
        self.inner.propagator.extract(&HeaderExtractor(headers))
    }

    /// Write the context of `cx` into `headers`.
    pub fn inject(&self, cx: &Context, headers: &mut HeaderMap) {
        self.inner
            .propagator
            .inject_context(cx, &mut HeaderInjector(headers));
    }

    /// Start a span as a child of `parent` and return the context holding it.
    pub fn start_span(
        &self,
        name: impl Into<String>,
        kind: SpanKind,
        parent: &Context,
        attributes: Vec<KeyValue>,
    ) -> Context {
        let span = self
            .inner
            .tracer
            .span_builder(name.into())
            .with_kind(kind)
            .with_attributes(attributes)
            .start_with_context(&self.inner.tracer, parent);
        parent.with_span(span)
    }

    /// Flush pending spans and stop the exporter.
    ///
    /// Runs on the blocking pool: the SDK waits synchronously on its batch
    /// worker.
    pub async fn shutdown(&self) -> Result<(), TelemetryError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || match &inner.export {
            Export::Otlp => {
                global::shutdown_tracer_provider();
                Ok(())
            }
            Export::Local(provider) => provider
                .force_flush()
                .into_iter()
                .find_map(Result::err)
                .map_or(Ok(()), |err| Err(TelemetryError::Flush(err.to_string()))),
        })
        .await?
    }
}

fn resource(config: &ObservabilityConfig) -> Resource {
    Resource::new(vec![
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            config.service_name.clone(),
        ),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ])
}

/// Lets the propagator write `traceparent`/`tracestate` into a header map.
struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let Ok(key) = key.parse::<HeaderName>() else {
            tracing::debug!(%key, "failed to parse header name");
            return;
        };
        let Ok(value) = HeaderValue::from_str(&value) else {
            tracing::debug!(%value, "failed to parse header value");
            return;
        };
        self.0.insert(key, value);
    }
}

/// Lets the propagator read trace headers from a header map.
struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanContext, TraceId};

    const PARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn child_span_joins_remote_trace() {
        let telemetry = Telemetry::disabled("test");
        let mut headers = HeaderMap::new();
        headers.insert("traceparent", HeaderValue::from_static(PARENT));

        let parent = telemetry.extract(&headers);
        let cx = telemetry.start_span("GET /", SpanKind::Server, &parent, Vec::new());
        let span = cx.span().span_context().clone();

        assert_eq!(
            span.trace_id(),
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap()
        );
        assert_ne!(span.span_id().to_string(), "00f067aa0ba902b7");
        assert!(span.is_valid());
    }

    #[test]
    fn missing_headers_start_new_root() {
        let telemetry = Telemetry::disabled("test");
        let parent = telemetry.extract(&HeaderMap::new());
        assert_eq!(parent.span().span_context(), &SpanContext::empty_context());

        let first = telemetry.start_span("a", SpanKind::Server, &parent, Vec::new());
        let second = telemetry.start_span("b", SpanKind::Server, &parent, Vec::new());
        assert!(first.span().span_context().is_valid());
        assert_ne!(
            first.span().span_context().trace_id(),
            second.span().span_context().trace_id()
        );
    }

    #[test]
    fn injected_headers_carry_the_span() {
        let telemetry = Telemetry::disabled("test");
        let cx = telemetry.start_span("call", SpanKind::Client, &Context::new(), Vec::new());

        let mut headers = HeaderMap::new();
        telemetry.inject(&cx, &mut headers);

        let traceparent = headers.get("traceparent").unwrap().to_str().unwrap();
        let span = cx.span().span_context().clone();
        assert_eq!(
            traceparent,
            format!("00-{}-{}-01", span.trace_id(), span.span_id())
        );
    }

    #[tokio::test]
    async fn local_shutdown_completes() {
        let telemetry = Telemetry::disabled("test");
        telemetry.shutdown().await.unwrap();
    }
}
