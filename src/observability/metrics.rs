//! Request metrics and exposition.
//!
//! # Responsibilities
//! - Register the request counter and latency histogram exactly once
//! - Record observations with optional trace exemplars
//! - Render the scrape body for `/metrics`
//!
//! # Metrics
//! - `http_server_requests_total` (counter): requests by method, status, uri
//! - `http_server_request_seconds` (histogram): latency distribution
//!
//! # Design Decisions
//! - Exemplar support is chosen once, at registry construction
//! - Every observation goes to the `metrics` facade over a local Prometheus recorder
//! - With exemplars, `prometheus-client` families record them as well
//! - `/metrics` serves OpenMetrics only to scrapers that accept it
//! - Labels are typed; the route comes from a fixed set of `&'static str`

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::exemplar::{CounterWithExemplar, HistogramWithExemplars};
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use crate::observability::TelemetryError;

pub const REQUESTS_TOTAL: &str = "http_server_requests_total";
pub const REQUEST_SECONDS: &str = "http_server_request_seconds";

/// Latency buckets in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

const OPENMETRICS_MEDIA_TYPE: &str = "application/openmetrics-text";

pub const OPENMETRICS_CONTENT_TYPE: &str =
    "application/openmetrics-text; version=1.0.0; charset=utf-8";
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Whether observations carry trace exemplars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExemplarSupport {
    Enabled,
    Disabled,
}

impl From<bool> for ExemplarSupport {
    fn from(enabled: bool) -> Self {
        if enabled {
            ExemplarSupport::Enabled
        } else {
            ExemplarSupport::Disabled
        }
    }
}

/// A route template label. Only literals can become routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route(&'static str);

impl Route {
    pub const WEATHER: Route = Route("/weather");
    pub const PING: Route = Route("/ping");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// HTTP method label with a closed value set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodLabel {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Connect,
    Options,
    Trace,
    Patch,
    Other,
}

impl MethodLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodLabel::Get => "GET",
            MethodLabel::Head => "HEAD",
            MethodLabel::Post => "POST",
            MethodLabel::Put => "PUT",
            MethodLabel::Delete => "DELETE",
            MethodLabel::Connect => "CONNECT",
            MethodLabel::Options => "OPTIONS",
            MethodLabel::Trace => "TRACE",
            MethodLabel::Patch => "PATCH",
            MethodLabel::Other => "OTHER",
        }
    }
}

impl From<&Method> for MethodLabel {
    fn from(method: &Method) -> Self {
        match *method {
            Method::GET => MethodLabel::Get,
            Method::HEAD => MethodLabel::Head,
            Method::POST => MethodLabel::Post,
            Method::PUT => MethodLabel::Put,
            Method::DELETE => MethodLabel::Delete,
            Method::CONNECT => MethodLabel::Connect,
            Method::OPTIONS => MethodLabel::Options,
            Method::TRACE => MethodLabel::Trace,
            Method::PATCH => MethodLabel::Patch,
            _ => MethodLabel::Other,
        }
    }
}

/// The label set shared by both request instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLabels {
    pub method: MethodLabel,
    pub status: StatusCode,
    pub route: Route,
}

impl RequestLabels {
    pub fn new(method: &Method, status: StatusCode, route: Route) -> Self {
        Self {
            method: MethodLabel::from(method),
            status,
            route,
        }
    }

    fn encoded(&self) -> HttpLabels {
        HttpLabels {
            method: self.method.as_str().to_string(),
            status: self.status.as_u16().to_string(),
            uri: self.route.as_str().to_string(),
        }
    }
}

/// Trace and span id attached to one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exemplar {
    pub trace_id: String,
    pub span_id: String,
}

impl Exemplar {
    /// Derive an exemplar from the context's active span.
    ///
    /// Returns `None` unless the span context is valid and sampled.
    pub fn from_context(cx: &Context) -> Option<Self> {
        let span = cx.span();
        let span_context = span.span_context();
        if !span_context.is_valid() || !span_context.is_sampled() {
            return None;
        }

        Some(Exemplar {
            trace_id: span_context.trace_id().to_string(),
            span_id: span_context.span_id().to_string(),
        })
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct HttpLabels {
    method: String,
    status: String,
    uri: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ExemplarLabels {
    trace_id: String,
    span_id: String,
}

impl From<&Exemplar> for ExemplarLabels {
    fn from(exemplar: &Exemplar) -> Self {
        ExemplarLabels {
            trace_id: exemplar.trace_id.clone(),
            span_id: exemplar.span_id.clone(),
        }
    }
}

type ExemplarHistogram = HistogramWithExemplars<ExemplarLabels>;
type HistogramFamily = Family<HttpLabels, ExemplarHistogram, fn() -> ExemplarHistogram>;
type CounterFamily = Family<HttpLabels, CounterWithExemplar<ExemplarLabels>>;

fn exemplar_histogram() -> ExemplarHistogram {
    HistogramWithExemplars::new(DEFAULT_BUCKETS.into_iter())
}

/// Text format of a scrape body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exposition {
    /// OpenMetrics 1.0 with exemplars.
    OpenMetrics,
    /// Prometheus text 0.0.4, no exemplars.
    Prometheus,
}

impl Exposition {
    /// Choose the format for a scrape from its `Accept` header.
    ///
    /// OpenMetrics is served only when exemplars are enabled and the scraper
    /// lists `application/openmetrics-text`.
    pub fn negotiate(accept: Option<&str>, support: ExemplarSupport) -> Self {
        if support == ExemplarSupport::Disabled {
            return Exposition::Prometheus;
        }

        let accepts_openmetrics = accept.is_some_and(|accept| {
            accept.split(',').any(|range| {
                range
                    .split(';')
                    .next()
                    .is_some_and(|media| media.trim().eq_ignore_ascii_case(OPENMETRICS_MEDIA_TYPE))
            })
        });

        if accepts_openmetrics {
            Exposition::OpenMetrics
        } else {
            Exposition::Prometheus
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Exposition::OpenMetrics => OPENMETRICS_CONTENT_TYPE,
            Exposition::Prometheus => PROMETHEUS_CONTENT_TYPE,
        }
    }
}

/// Owns the instrument namespace and the exposition backends.
///
/// The Prometheus recorder always receives every observation. With exemplars
/// enabled, a `prometheus-client` registry receives them as well.
pub struct MetricsRegistry {
    names: HashSet<&'static str>,
    openmetrics: Option<Registry>,
    prometheus: Arc<PrometheusRecorder>,
}

impl MetricsRegistry {
    pub fn new(support: ExemplarSupport) -> Result<Self, TelemetryError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets(&DEFAULT_BUCKETS)
            .map_err(|e| TelemetryError::Buckets(e.to_string()))?
            .build_recorder();

        let openmetrics = match support {
            ExemplarSupport::Enabled => Some(Registry::default()),
            ExemplarSupport::Disabled => None,
        };

        Ok(Self {
            names: HashSet::new(),
            openmetrics,
            prometheus: Arc::new(recorder),
        })
    }

    pub fn exemplar_support(&self) -> ExemplarSupport {
        self.openmetrics.is_some().into()
    }

    fn claim(&mut self, name: &'static str) -> Result<(), TelemetryError> {
        if !self.names.insert(name) {
            return Err(TelemetryError::DuplicateMetric(name));
        }
        Ok(())
    }

    /// Register a counter. `name` carries the `_total` suffix.
    pub fn register_counter(
        &mut self,
        name: &'static str,
        help: &str,
    ) -> Result<Counter, TelemetryError> {
        self.claim(name)?;

        let exemplars = self.openmetrics.as_mut().map(|registry| {
            let family = CounterFamily::default();
            // prometheus-client appends the suffix itself
            let base = name.strip_suffix("_total").unwrap_or(name);
            registry.register(base, help, family.clone());
            family
        });

        metrics::with_local_recorder(self.prometheus.as_ref(), || {
            metrics::describe_counter!(name, help.to_string());
        });

        tracing::debug!(metric = name, "Registered counter");
        Ok(Counter {
            name,
            exemplars,
            recorder: self.prometheus.clone(),
        })
    }

    pub fn register_histogram(
        &mut self,
        name: &'static str,
        help: &str,
    ) -> Result<Histogram, TelemetryError> {
        self.claim(name)?;

        let exemplars = self.openmetrics.as_mut().map(|registry| {
            let family = HistogramFamily::new_with_constructor(exemplar_histogram as fn() -> _);
            registry.register(name, help, family.clone());
            family
        });

        metrics::with_local_recorder(self.prometheus.as_ref(), || {
            metrics::describe_histogram!(name, help.to_string());
        });

        tracing::debug!(metric = name, "Registered histogram");
        Ok(Histogram {
            name,
            exemplars,
            recorder: self.prometheus.clone(),
        })
    }

    /// Render every registered instrument in `format`.
    ///
    /// Falls back to Prometheus text when no OpenMetrics registry exists.
    pub fn encode(&self, format: Exposition) -> Result<String, TelemetryError> {
        match (format, &self.openmetrics) {
            (Exposition::OpenMetrics, Some(registry)) => {
                let mut body = String::new();
                prometheus_client::encoding::text::encode(&mut body, registry)?;
                Ok(body)
            }
            _ => Ok(self.prometheus.handle().render()),
        }
    }
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("names", &self.names)
            .field("exemplars", &self.exemplar_support())
            .finish()
    }
}

/// A monotonically increasing request counter.
pub struct Counter {
    name: &'static str,
    exemplars: Option<CounterFamily>,
    recorder: Arc<PrometheusRecorder>,
}

impl Counter {
    pub fn increment(&self, labels: &RequestLabels, exemplar: Option<&Exemplar>) {
        if let Some(family) = &self.exemplars {
            family
                .get_or_create(&labels.encoded())
                .inc_by(1, exemplar.map(ExemplarLabels::from));
        }

        metrics::with_local_recorder(self.recorder.as_ref(), || {
            metrics::counter!(
                self.name,
                "method" => labels.method.as_str(),
                "status" => labels.status.as_u16().to_string(),
                "uri" => labels.route.as_str()
            )
            .increment(1);
        });
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("name", &self.name)
            .field("exemplars", &self.exemplars.is_some())
            .finish()
    }
}

/// A latency histogram in seconds.
pub struct Histogram {
    name: &'static str,
    exemplars: Option<HistogramFamily>,
    recorder: Arc<PrometheusRecorder>,
}

impl Histogram {
    pub fn observe(&self, labels: &RequestLabels, elapsed: Duration, exemplar: Option<&Exemplar>) {
        let seconds = elapsed.as_secs_f64();
        if let Some(family) = &self.exemplars {
            family
                .get_or_create(&labels.encoded())
                .observe(seconds, exemplar.map(ExemplarLabels::from));
        }

        metrics::with_local_recorder(self.recorder.as_ref(), || {
            metrics::histogram!(
                self.name,
                "method" => labels.method.as_str(),
                "status" => labels.status.as_u16().to_string(),
                "uri" => labels.route.as_str()
            )
            .record(seconds);
        });
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("name", &self.name)
            .field("exemplars", &self.exemplars.is_some())
            .finish()
    }
}

/// The two request instruments plus their registry.
pub struct HttpMetrics {
    registry: MetricsRegistry,
    requests: Counter,
    duration: Histogram,
}

impl HttpMetrics {
    pub fn register(support: ExemplarSupport) -> Result<Self, TelemetryError> {
        let mut registry = MetricsRegistry::new(support)?;
        let requests = registry.register_counter(REQUESTS_TOTAL, "Total HTTP requests handled")?;
        let duration =
            registry.register_histogram(REQUEST_SECONDS, "HTTP request latency in seconds")?;

        tracing::info!(exemplars = ?support, "Request metrics registered");

        Ok(Self {
            registry,
            requests,
            duration,
        })
    }

    /// Record one finished request on both instruments.
    pub fn record(&self, labels: &RequestLabels, elapsed: Duration, exemplar: Option<&Exemplar>) {
        self.requests.increment(labels, exemplar);
        self.duration.observe(labels, elapsed, exemplar);
    }

    pub fn encode(&self, format: Exposition) -> Result<String, TelemetryError> {
        self.registry.encode(format)
    }

    /// Negotiate the format for `accept` and render the scrape body.
    pub fn scrape(&self, accept: Option<&str>) -> Result<(Exposition, String), TelemetryError> {
        let format = Exposition::negotiate(accept, self.exemplar_support());
        Ok((format, self.encode(format)?))
    }

    pub fn exemplar_support(&self) -> ExemplarSupport {
        self.registry.exemplar_support()
    }
}

impl fmt::Debug for HttpMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpMetrics")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
