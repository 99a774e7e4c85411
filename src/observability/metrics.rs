//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Own the Prometheus recorder every collector registers into
//! - Define per-subsystem collectors (server, each outbound client)
//! - Render the text exposition for the scrape endpoint
//!
//! # Metrics
//! - `{tag}_processed_ops_total` (counter): every operation
//! - `{tag}_processed_ops_count` (counter): operations by outcome labels
//! - `{tag}_processed_ops_latency` / `{tag}_processed_ops_http_latency`
//!   (histogram): latency in milliseconds
//!
//! # Design Decisions
//! - The registry is constructed by startup code and passed down; the
//!   recorder is never installed globally
//! - Label-keyed handles are resolved by the recorder's sharded registry,
//!   so recording needs no locking by the caller
//! - Every label set carries the collector's tag

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashSet;
use metrics::{Counter, Histogram, Key, KeyName, Label, Level, Metadata, Recorder, SharedString, Unit};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

/// Latency bucket boundaries in milliseconds.
pub const LATENCY_BUCKETS_MS: [f64; 18] = [
    1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
    15000.0, 20000.0, 25000.0, 50000.0, 100000.0,
];

static METADATA: Metadata<'static> =
    Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics collector has no name")]
    EmptyTag,
    #[error("metrics collector `{0}` is already registered")]
    AlreadyRegistered(String),
    #[error("failed to build prometheus recorder: {0}")]
    Build(#[from] BuildError),
}

/// Process-wide home of every collector's series.
#[derive(Clone)]
pub struct MetricsRegistry {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
    tags: Arc<DashSet<String>>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Suffix("latency".to_string()), &LATENCY_BUCKETS_MS)?
            .build_recorder();
        let handle = recorder.handle();

        Ok(Self {
            recorder: Arc::new(recorder),
            handle,
            tags: Arc::new(DashSet::new()),
        })
    }

    /// Build a collector with the default metric set and register it.
    pub fn collector(&self, name: &str) -> Result<MetricsCollector, MetricsError> {
        self.collector_with(name, &[])
    }

    /// Build a collector with the given metric set and register it.
    ///
    /// An empty `metrics` slice selects the default set. Registering the
    /// same tag twice fails.
    pub fn collector_with(
        &self,
        name: &str,
        metrics: &[CollectorMetric],
    ) -> Result<MetricsCollector, MetricsError> {
        if name.is_empty() {
            return Err(MetricsError::EmptyTag);
        }

        let tag = name.replace('.', "_");
        if !self.tags.insert(tag.clone()) {
            return Err(MetricsError::AlreadyRegistered(tag));
        }

        let metrics = if metrics.is_empty() {
            &DEFAULT_COLLECTOR_METRICS[..]
        } else {
            metrics
        };

        let mut collector = MetricsCollector {
            tag: SharedString::from(tag),
            recorder: Arc::clone(&self.recorder),
            counter: None,
            counter_vec: None,
            latency_vec: None,
        };
        for metric in metrics {
            metric.apply(&mut collector);
        }

        tracing::debug!(tag = %collector.tag, "metrics collector registered");
        Ok(collector)
    }

    /// Text exposition of every registered series.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// The metric families a collector can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorMetric {
    /// Bare operation counter.
    TotalOperations,
    /// Operation counter labelled by outcome and tag.
    TotalOperationsWithLabels,
    /// Operation counter labelled by method, url, status and tag.
    TotalHttpOperationsWithLabels,
    /// Latency histogram labelled by tag.
    Latency,
    /// Latency histogram labelled by method and tag.
    LatencyWithLabels,
    /// Latency histogram labelled by method, url, status and tag.
    HttpLatencyWithLabels,
}

const DEFAULT_COLLECTOR_METRICS: [CollectorMetric; 3] = [
    CollectorMetric::TotalOperations,
    CollectorMetric::TotalOperationsWithLabels,
    CollectorMetric::Latency,
];

/// Metric set used by HTTP server and client collectors.
pub const HTTP_COLLECTOR_METRICS: [CollectorMetric; 3] = [
    CollectorMetric::TotalOperations,
    CollectorMetric::TotalHttpOperationsWithLabels,
    CollectorMetric::HttpLatencyWithLabels,
];

const LABEL_TAG: &str = "tag";
const LABEL_STATUS: &str = "status";
const LABEL_METHOD: &str = "method";
const LABEL_URL: &str = "url";

impl CollectorMetric {
    fn apply(self, collector: &mut MetricsCollector) {
        let tag = collector.tag.clone();
        match self {
            Self::TotalOperations => {
                let name = format!("{tag}_processed_ops_total");
                collector.describe_counter(&name, "The total number of processed operations");
                collector.counter = Some(
                    collector
                        .recorder
                        .register_counter(&Key::from_name(name), &METADATA),
                );
            }
            Self::TotalOperationsWithLabels => {
                collector.counter_vec = Some(collector.family(
                    "processed_ops_count",
                    "The total number of processed operations grouped by labels",
                    &[LABEL_STATUS, LABEL_TAG],
                ));
            }
            Self::TotalHttpOperationsWithLabels => {
                collector.counter_vec = Some(collector.family(
                    "processed_ops_count",
                    "The total number of http operations grouped by labels",
                    &[LABEL_METHOD, LABEL_URL, LABEL_STATUS, LABEL_TAG],
                ));
            }
            Self::Latency => {
                collector.latency_vec = Some(collector.histogram_family(
                    "processed_ops_latency",
                    "The total latency in milliseconds of processed operations grouped in buckets",
                    &[LABEL_TAG],
                ));
            }
            Self::LatencyWithLabels => {
                collector.latency_vec = Some(collector.histogram_family(
                    "processed_ops_latency",
                    "The total latency in milliseconds of processed operations grouped in buckets with labels",
                    &[LABEL_METHOD, LABEL_TAG],
                ));
            }
            Self::HttpLatencyWithLabels => {
                collector.latency_vec = Some(collector.histogram_family(
                    "processed_ops_http_latency",
                    "The total HTTP latency in milliseconds of processed operations grouped in buckets with labels",
                    &[LABEL_METHOD, LABEL_URL, LABEL_STATUS, LABEL_TAG],
                ));
            }
        }
    }
}

/// A labelled metric family: its full name and the label names it keeps.
#[derive(Debug, Clone)]
struct Family {
    name: String,
    labels: &'static [&'static str],
}

impl Family {
    /// Build the series key, keeping only the labels this family declares.
    fn key(&self, values: &[(&'static str, SharedString)]) -> Key {
        let labels: Vec<Label> = self
            .labels
            .iter()
            .map(|name| {
                let value = values
                    .iter()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.clone())
                    .unwrap_or_else(|| SharedString::const_str(""));
                Label::new(*name, value)
            })
            .collect();
        Key::from_parts(self.name.clone(), labels)
    }
}

/// Outcome recorded by [`MetricsCollector::record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Increment the bare counter.
    Total,
    /// Observe the latency since `start`.
    Latency,
    /// Count a failed operation.
    Error,
    /// Count a completed operation under its labels.
    Success,
}

/// Labels attached to an HTTP observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpMetricLabels {
    method: String,
    url: String,
    status: u16,
}

impl HttpMetricLabels {
    pub fn new(method: impl Into<String>, url: impl Into<String>, status: u16) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            status,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }
}

/// A named bundle of counters and histograms for one subsystem.
pub struct MetricsCollector {
    tag: SharedString,
    recorder: Arc<PrometheusRecorder>,
    counter: Option<Counter>,
    counter_vec: Option<Family>,
    latency_vec: Option<Family>,
}

impl MetricsCollector {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn family(&self, suffix: &str, help: &'static str, labels: &'static [&'static str]) -> Family {
        let name = format!("{}_{suffix}", self.tag);
        self.describe_counter(&name, help);
        Family { name, labels }
    }

    fn histogram_family(
        &self,
        suffix: &str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Family {
        let name = format!("{}_{suffix}", self.tag);
        self.recorder.describe_histogram(
            KeyName::from(name.clone()),
            Some(Unit::Milliseconds),
            SharedString::const_str(help),
        );
        Family { name, labels }
    }

    fn describe_counter(&self, name: &str, help: &'static str) {
        self.recorder.describe_counter(
            KeyName::from(name.to_string()),
            None,
            SharedString::const_str(help),
        );
    }

    fn increment(&self, family: Option<&Family>, values: &[(&'static str, SharedString)]) {
        if let Some(family) = family {
            self.recorder
                .register_counter(&family.key(values), &METADATA)
                .increment(1);
        }
    }

    fn observe(&self, values: &[(&'static str, SharedString)], start: Instant) {
        if let Some(family) = &self.latency_vec {
            let histogram: Histogram = self.recorder.register_histogram(&family.key(values), &METADATA);
            histogram.record(elapsed_ms(start));
        }
    }

    fn tag_label(&self) -> (&'static str, SharedString) {
        (LABEL_TAG, self.tag.clone())
    }

    fn http_labels(&self, labels: &HttpMetricLabels) -> [(&'static str, SharedString); 4] {
        [
            (LABEL_METHOD, SharedString::from(labels.method.clone())),
            (LABEL_URL, SharedString::from(labels.url.clone())),
            (LABEL_STATUS, SharedString::from(labels.status.to_string())),
            self.tag_label(),
        ]
    }

    /// Increment the bare operation counter.
    pub fn record_total(&self) {
        if let Some(counter) = &self.counter {
            counter.increment(1);
        }
    }

    /// Observe the latency since `start`, labelled by tag only.
    pub fn record_latency(&self, start: Instant) {
        self.observe(&[self.tag_label()], start);
    }

    /// Observe the latency since `start`, labelled by method.
    pub fn record_latency_with_method(&self, start: Instant, method: &str) {
        self.observe(
            &[
                (LABEL_METHOD, SharedString::from(method.to_string())),
                self.tag_label(),
            ],
            start,
        );
    }

    /// Observe the latency since `start` under the given HTTP labels.
    pub fn record_http_latency(&self, start: Instant, labels: &HttpMetricLabels) {
        self.observe(&self.http_labels(labels), start);
    }

    /// Count an HTTP outcome under its labels.
    pub fn record_http(&self, labels: &HttpMetricLabels) {
        self.increment(self.counter_vec.as_ref(), &self.http_labels(labels));
    }

    /// Count a failed operation.
    pub fn record_error(&self) {
        self.increment(
            self.counter_vec.as_ref(),
            &[(LABEL_STATUS, SharedString::const_str("error")), self.tag_label()],
        );
    }

    /// Count a successful operation.
    pub fn record_success(&self) {
        self.increment(
            self.counter_vec.as_ref(),
            &[(LABEL_STATUS, SharedString::const_str("success")), self.tag_label()],
        );
    }

    /// Dispatch a recording by kind.
    pub fn record(&self, kind: MetricKind, labels: &HttpMetricLabels, start: Instant) {
        match kind {
            MetricKind::Total => self.record_total(),
            MetricKind::Latency => self.record_http_latency(start, labels),
            MetricKind::Error => self.record_error(),
            MetricKind::Success => self.record_http(labels),
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::time::Duration;

    /// Value of the first rendered sample named `name` carrying every label
    /// fragment (`key="value"`).
    pub(crate) fn sample(rendered: &str, name: &str, labels: &[&str]) -> Option<f64> {
        rendered
            .lines()
            .filter(|line| !line.starts_with('#'))
            .filter(|line| {
                line.strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with('{') || rest.starts_with(' '))
            })
            .find(|line| labels.iter().all(|label| line.contains(label)))
            .and_then(|line| line.rsplit(' ').next())
            .and_then(|value| value.parse().ok())
    }

    #[test]
    fn empty_tag_is_rejected() {
        let registry = MetricsRegistry::new().unwrap();
        assert!(matches!(registry.collector(""), Err(MetricsError::EmptyTag)));
    }

    #[test]
    fn duplicate_tag_is_rejected() {
        let registry = MetricsRegistry::new().unwrap();
        registry.collector("orders.api").unwrap();
        match registry.collector("orders_api") {
            Err(MetricsError::AlreadyRegistered(tag)) => assert_eq!(tag, "orders_api"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second registration succeeded"),
        }
    }

    #[test]
    fn dots_in_tag_become_underscores() {
        let registry = MetricsRegistry::new().unwrap();
        let collector = registry.collector("example.client").unwrap();
        assert_eq!(collector.tag(), "example_client");
    }

    #[test]
    fn default_set_records_total_outcome_and_latency() {
        let registry = MetricsRegistry::new().unwrap();
        let collector = registry.collector("jobs").unwrap();

        collector.record_total();
        collector.record_total();
        collector.record_success();
        collector.record_error();
        collector.record_latency(Instant::now());

        let rendered = registry.render();
        assert_eq!(sample(&rendered, "jobs_processed_ops_total", &[]), Some(2.0));
        assert_eq!(
            sample(&rendered, "jobs_processed_ops_count", &["status=\"success\"", "tag=\"jobs\""]),
            Some(1.0)
        );
        assert_eq!(
            sample(&rendered, "jobs_processed_ops_count", &["status=\"error\""]),
            Some(1.0)
        );
        assert_eq!(
            sample(&rendered, "jobs_processed_ops_latency_count", &["tag=\"jobs\""]),
            Some(1.0)
        );
    }

    #[test]
    fn http_labels_partition_series() {
        let registry = MetricsRegistry::new().unwrap();
        let collector = registry.collector_with("svc", &HTTP_COLLECTOR_METRICS).unwrap();

        let ok = HttpMetricLabels::new("GET", "/orders", 200);
        let missing = HttpMetricLabels::new("GET", "/orders", 404);
        collector.record_http(&ok);
        collector.record_http(&ok);
        collector.record_http(&missing);

        let rendered = registry.render();
        assert_eq!(
            sample(&rendered, "svc_processed_ops_count", &["status=\"200\"", "url=\"/orders\""]),
            Some(2.0)
        );
        assert_eq!(
            sample(&rendered, "svc_processed_ops_count", &["status=\"404\""]),
            Some(1.0)
        );
    }

    #[test]
    fn latency_is_bounded_by_elapsed_time() {
        let registry = MetricsRegistry::new().unwrap();
        let collector = registry.collector_with("timed", &HTTP_COLLECTOR_METRICS).unwrap();
        let labels = HttpMetricLabels::new("POST", "upstream:80", 201);

        let outer = Instant::now();
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(20));
        collector.record_http_latency(start, &labels);
        let bound = outer.elapsed().as_secs_f64() * 1000.0;

        let rendered = registry.render();
        let sum = sample(&rendered, "timed_processed_ops_http_latency_sum", &["status=\"201\""]).unwrap();
        assert!(sum >= 20.0, "observed {sum}ms");
        assert!(sum <= bound, "observed {sum}ms, wall clock {bound}ms");
    }

    #[test]
    fn missing_family_is_a_no_op() {
        let registry = MetricsRegistry::new().unwrap();
        let collector = registry
            .collector_with("bare", &[CollectorMetric::TotalOperations])
            .unwrap();

        collector.record_error();
        collector.record_latency(Instant::now());
        collector.record_total();

        let rendered = registry.render();
        assert_eq!(sample(&rendered, "bare_processed_ops_total", &[]), Some(1.0));
        assert!(!rendered.contains("bare_processed_ops_count"));
    }

    #[test]
    fn concurrent_recording_is_not_lost() {
        let registry = MetricsRegistry::new().unwrap();
        let collector = Arc::new(registry.collector_with("hot", &HTTP_COLLECTOR_METRICS).unwrap());

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let collector = Arc::clone(&collector);
                std::thread::spawn(move || {
                    let labels = HttpMetricLabels::new("GET", format!("/{}", i % 2), 200);
                    for _ in 0..250 {
                        collector.record_total();
                        collector.record_http(&labels);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let rendered = registry.render();
        assert_eq!(sample(&rendered, "hot_processed_ops_total", &[]), Some(2000.0));
        assert_eq!(sample(&rendered, "hot_processed_ops_count", &["url=\"/0\""]), Some(1000.0));
        assert_eq!(sample(&rendered, "hot_processed_ops_count", &["url=\"/1\""]), Some(1000.0));
    }
}
