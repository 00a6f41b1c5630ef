//! Distributed tracing support.
//!
//! # Responsibilities
//! - Install the tracer provider (always-on sampling, batched export)
//! - Attach resource attributes identifying this service
//! - Extract trace context from incoming requests
//! - Inject trace context into outbound requests
//! - Flush and shut down exactly once before exit
//!
//! # Design Decisions
//! - The handle is passed explicitly to handlers; the global propagator is
//!   installed only so third-party instrumentation sees the same format
//! - W3C Trace Context plus W3C Baggage, composed into one propagator
//! - Request tasks never wait on export; the batch queue drops on overflow

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::HeaderMap;
use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{Context, KeyValue};
use opentelemetry_http::{HeaderExtractor, HeaderInjector};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracer, SdkTracerProvider, SpanExporter,
};
use opentelemetry_sdk::Resource;

use crate::config::TelemetryConfig;
use crate::observability::exporter::TraceExporter;
use crate::observability::TelemetryError;

/// Instrumentation scope name for spans created by this crate.
pub const TRACER_NAME: &str = env!("CARGO_PKG_NAME");

/// Value of the `library.language` resource attribute.
pub const LIBRARY_LANGUAGE: &str = "rust";

/// Process-wide trace state: provider, tracer and propagator.
///
/// Created once at startup and shared through `Arc`. [`TraceProvider::shutdown`]
/// is idempotent and also runs on drop.
pub struct TraceProvider {
    provider: SdkTracerProvider,
    tracer: SdkTracer,
    propagator: Arc<TextMapCompositePropagator>,
    shut_down: AtomicBool,
}

impl TraceProvider {
    /// Install the exporter chosen by the exporter factory.
    pub fn init(exporter: TraceExporter, config: &TelemetryConfig) -> Self {
        tracing::info!(
            exporter = exporter.kind(),
            service_name = %config.service_name,
            "Initialising trace provider"
        );

        match exporter {
            TraceExporter::Console(exporter) => Self::with_exporter(exporter, config),
            TraceExporter::Collector(exporter) => Self::with_exporter(exporter, config),
        }
    }

    /// Install any span exporter behind the batch processor.
    pub fn with_exporter<E>(exporter: E, config: &TelemetryConfig) -> Self
    where
        E: SpanExporter + 'static,
    {
        let batch_config = BatchConfigBuilder::default()
            .with_max_queue_size(config.batch.max_queue_size)
            .with_max_export_batch_size(config.batch.max_export_batch_size)
            .with_scheduled_delay(config.batch.scheduled_delay())
            .build();

        let processor = BatchSpanProcessor::builder(exporter)
            .with_batch_config(batch_config)
            .build();

        let provider = SdkTracerProvider::builder()
            .with_sampler(Sampler::AlwaysOn)
            .with_span_processor(processor)
            .with_resource(build_resource(config))
            .build();

        opentelemetry::global::set_text_map_propagator(composite_propagator());
        opentelemetry::global::set_tracer_provider(provider.clone());

        Self {
            tracer: provider.tracer(TRACER_NAME),
            provider,
            propagator: Arc::new(composite_propagator()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn tracer(&self) -> &SdkTracer {
        &self.tracer
    }

    pub fn propagator(&self) -> Arc<TextMapCompositePropagator> {
        self.propagator.clone()
    }

    /// Decode trace context and baggage from request headers.
    ///
    /// Headers without a valid `traceparent` yield a context with no span.
    pub fn extract(&self, headers: &HeaderMap) -> Context {
        self.propagator.extract(&HeaderExtractor(headers))
    }

    /// Encode `cx` into outbound headers.
    pub fn inject(&self, cx: &Context, headers: &mut HeaderMap) {
        self.propagator.inject_context(cx, &mut HeaderInjector(headers));
    }

    /// Push buffered spans to the exporter without shutting down.
    pub fn force_flush(&self) -> Result<(), TelemetryError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Ok(());
        }
        self.provider.force_flush().map_err(TelemetryError::Shutdown)
    }

    /// Flush buffered spans and close the exporter.
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    pub fn shutdown(&self) -> Result<(), TelemetryError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            tracing::debug!("Trace provider already shut down");
            return Ok(());
        }

        tracing::info!("Flushing and shutting down trace provider");
        self.provider.shutdown().map_err(TelemetryError::Shutdown)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Drop for TraceProvider {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "Trace provider shutdown on drop failed");
        }
    }
}

impl std::fmt::Debug for TraceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceProvider")
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

/// W3C trace-context and baggage, in that order.
pub fn composite_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

fn build_resource(config: &TelemetryConfig) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("library.language", LIBRARY_LANGUAGE),
        ])
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::baggage::BaggageExt;
    use opentelemetry::trace::{Span, TraceContextExt, Tracer};
    use opentelemetry_sdk::trace::InMemorySpanExporter;

    fn provider() -> (TraceProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TraceProvider::with_exporter(exporter.clone(), &TelemetryConfig::default());
        (provider, exporter)
    }

    #[test]
    fn every_span_is_sampled() {
        let (provider, _) = provider();
        let span = provider.tracer().start("sampled");
        assert!(span.span_context().is_sampled());
        assert!(span.span_context().is_valid());
    }

    #[test]
    fn resource_carries_service_name_and_language() {
        let (provider, exporter) = provider();
        provider.tracer().start("resource").end();
        provider.force_flush().unwrap();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);

        let resource = build_resource(&TelemetryConfig::default());
        let language = resource.get(&opentelemetry::Key::from_static_str("library.language"));
        assert_eq!(language.map(|v| v.to_string()), Some("rust".to_string()));
        let name = resource.get(&opentelemetry::Key::from_static_str("service.name"));
        assert_eq!(name.map(|v| v.to_string()), Some("02-tracing-rust".to_string()));
    }

    #[test]
    fn inject_then_extract_preserves_ids_and_baggage() {
        let (provider, _) = provider();
        let span = provider.tracer().start("parent");
        let cx = Context::new()
            .with_span(span)
            .with_baggage([KeyValue::new("tenant", "helsinki")]);

        let mut headers = HeaderMap::new();
        provider.inject(&cx, &mut headers);
        assert!(headers.contains_key("traceparent"));
        assert!(headers.contains_key("baggage"));

        let extracted = provider.extract(&headers);
        let original = cx.span().span_context().clone();
        let decoded = extracted.span().span_context().clone();
        assert_eq!(decoded.trace_id(), original.trace_id());
        assert_eq!(decoded.span_id(), original.span_id());
        assert!(decoded.is_remote());
        assert_eq!(
            extracted.baggage().get("tenant").map(|v| v.to_string()),
            Some("helsinki".to_string())
        );
    }

    #[test]
    fn missing_headers_extract_to_invalid_span() {
        let (provider, _) = provider();
        let cx = provider.extract(&HeaderMap::new());
        assert!(!cx.span().span_context().is_valid());
    }

    #[derive(Debug, Clone, Default)]
    struct CountingExporter(Arc<std::sync::atomic::AtomicUsize>);

    impl SpanExporter for CountingExporter {
        fn export(
            &self,
            batch: Vec<opentelemetry_sdk::trace::SpanData>,
        ) -> impl std::future::Future<Output = opentelemetry_sdk::error::OTelSdkResult> + Send
        {
            self.0.fetch_add(batch.len(), Ordering::SeqCst);
            std::future::ready(Ok(()))
        }
    }

    #[test]
    fn shutdown_twice_is_ok_and_exports_once() {
        let exporter = CountingExporter::default();
        let provider = TraceProvider::with_exporter(exporter.clone(), &TelemetryConfig::default());
        provider.tracer().start("only-once").end();

        provider.shutdown().unwrap();
        assert_eq!(exporter.0.load(Ordering::SeqCst), 1);

        provider.shutdown().unwrap();
        provider.force_flush().unwrap();
        drop(provider);
        assert_eq!(exporter.0.load(Ordering::SeqCst), 1);
    }
}
