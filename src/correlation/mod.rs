//! Per-request metric and trace correlation.
//!
//! # Responsibilities
//! - Capture the start instant and the active span's exemplar
//! - Record one counter increment and one histogram observation per request
//!
//! # Design Decisions
//! - [`InFlight::complete`] takes `self`, so a request can only be recorded once
//! - Every terminal outcome is recorded, including validation failures
//! - An in-flight request dropped without completing is not recorded

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Method, StatusCode};
use opentelemetry::Context;

use crate::observability::metrics::{Exemplar, HttpMetrics, RequestLabels, Route};

/// Entry point handlers use to bracket a request.
#[derive(Debug, Clone)]
pub struct RequestCorrelator {
    metrics: Arc<HttpMetrics>,
}

impl RequestCorrelator {
    pub fn new(metrics: Arc<HttpMetrics>) -> Self {
        Self { metrics }
    }

    /// Start tracking a request whose server span lives in `cx`.
    pub fn begin(&self, cx: &Context, method: &Method, route: Route) -> InFlight {
        InFlight {
            metrics: self.metrics.clone(),
            method: method.clone(),
            route,
            exemplar: Exemplar::from_context(cx),
            started: Instant::now(),
        }
    }
}

/// A request that has started but not yet produced a status.
#[derive(Debug)]
#[must_use = "an in-flight request records nothing until completed"]
pub struct InFlight {
    metrics: Arc<HttpMetrics>,
    method: Method,
    route: Route,
    exemplar: Option<Exemplar>,
    started: Instant,
}

impl InFlight {
    pub fn exemplar(&self) -> Option<&Exemplar> {
        self.exemplar.as_ref()
    }

    /// Record the outcome on both instruments and return the elapsed time.
    pub fn complete(self, status: StatusCode) -> Duration {
        let elapsed = self.started.elapsed();
        let labels = RequestLabels::new(&self.method, status, self.route);

        self.metrics
            .record(&labels, elapsed, self.exemplar.as_ref());

        tracing::debug!(
            method = labels.method.as_str(),
            status = status.as_u16(),
            route = %self.route,
            elapsed_ms = elapsed.as_millis() as u64,
            exemplar = self.exemplar.is_some(),
            "Request recorded"
        );

        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::{ExemplarSupport, Exposition};
    use opentelemetry::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };

    fn series(body: &str, status: &str) -> Vec<String> {
        body.lines()
            .filter(|l| l.starts_with("http_server_requests_total{"))
            .filter(|l| l.contains(&format!("status=\"{status}\"")))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn complete_records_once_with_final_status() {
        let metrics = Arc::new(HttpMetrics::register(ExemplarSupport::Enabled).unwrap());
        let correlator = RequestCorrelator::new(metrics.clone());

        let in_flight = correlator.begin(&Context::new(), &Method::GET, Route::WEATHER);
        assert!(in_flight.exemplar().is_none());
        in_flight.complete(StatusCode::BAD_GATEWAY);

        let body = metrics.encode(Exposition::OpenMetrics).unwrap();
        let lines = series(&body, "502");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(" 1"));
        assert!(series(&body, "200").is_empty());
    }

    #[test]
    fn exemplar_comes_from_context_span() {
        let metrics = Arc::new(HttpMetrics::register(ExemplarSupport::Enabled).unwrap());
        let correlator = RequestCorrelator::new(metrics.clone());
        let span_context = SpanContext::new(
            TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap(),
            SpanId::from_hex("b7ad6b7169203331").unwrap(),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );
        let cx = Context::new().with_remote_span_context(span_context);

        let in_flight = correlator.begin(&cx, &Method::GET, Route::PING);
        assert_eq!(
            in_flight.exemplar().map(|e| e.span_id.as_str()),
            Some("b7ad6b7169203331")
        );
        in_flight.complete(StatusCode::OK);

        let body = metrics.encode(Exposition::OpenMetrics).unwrap();
        let lines = series(&body, "200");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("trace_id=\"0af7651916cd43dd8448eb211c80319c\""));
    }

    #[test]
    fn dropped_request_is_not_recorded() {
        let metrics = Arc::new(HttpMetrics::register(ExemplarSupport::Enabled).unwrap());
        let correlator = RequestCorrelator::new(metrics.clone());

        drop(correlator.begin(&Context::new(), &Method::GET, Route::WEATHER));

        let body = metrics.encode(Exposition::OpenMetrics).unwrap();
        assert!(!body.contains("http_server_requests_total{"));
    }
}
