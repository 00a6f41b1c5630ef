//! Trace exporter selection.
//!
//! # Responsibilities
//! - Pick the exporter backend from [`TelemetryConfig::mode`]
//! - Render spans for humans when running locally
//! - Bind an OTLP/gRPC exporter to the collector otherwise
//!
//! # Design Decisions
//! - A collector without an endpoint is a fatal configuration error, there is
//!   no sensible default destination
//! - Endpoints without a scheme are treated as plaintext `http://` (insecure channel)
//! - Construction errors are surfaced, never retried

use std::fmt;
use std::future::Future;
use std::io::{self, Write};
use std::sync::Mutex;

use opentelemetry::trace::Status;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use opentelemetry_sdk::Resource;
use serde_json::{json, Value};
use url::Url;

use crate::config::{ExportMode, TelemetryConfig};
use crate::observability::TelemetryError;

/// The exporter chosen for this process.
#[derive(Debug)]
pub enum TraceExporter {
    /// Pretty-printed spans on a local writer.
    Console(ConsoleExporter),
    /// OTLP/gRPC export to a collector.
    Collector(opentelemetry_otlp::SpanExporter),
}

impl TraceExporter {
    pub fn kind(&self) -> &'static str {
        match self {
            TraceExporter::Console(_) => "console",
            TraceExporter::Collector(_) => "otlp-grpc",
        }
    }
}

/// Build the exporter described by `config`.
///
/// Must run inside a Tokio runtime when the collector branch is taken, the
/// gRPC channel is created lazily on the current runtime.
pub fn build_exporter(config: &TelemetryConfig) -> Result<TraceExporter, TelemetryError> {
    match config.mode {
        ExportMode::Local => Ok(TraceExporter::Console(ConsoleExporter::stdout())),
        ExportMode::Collector => {
            let endpoint = collector_endpoint(&config.endpoint)?;
            tracing::info!(endpoint = %endpoint, "Exporting traces to collector");

            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .with_timeout(config.batch.export_timeout())
                .build()?;

            Ok(TraceExporter::Collector(exporter))
        }
    }
}

/// Normalise and check a collector endpoint.
pub fn collector_endpoint(raw: &str) -> Result<String, TelemetryError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TelemetryError::MissingCollectorEndpoint);
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let invalid = |reason: String| TelemetryError::InvalidCollectorEndpoint {
        endpoint: raw.to_string(),
        reason,
    };

    let url = Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Span exporter that writes one indented JSON document per span.
///
/// Timestamps are left out so the output stays stable and readable.
pub struct ConsoleExporter {
    writer: Mutex<Box<dyn Write + Send>>,
    resource: Vec<(String, String)>,
}

impl ConsoleExporter {
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            writer: Mutex::new(Box::new(writer)),
            resource: Vec::new(),
        }
    }

    fn write_batch(&self, batch: &[SpanData]) -> OTelSdkResult {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| OTelSdkError::InternalFailure("console writer poisoned".into()))?;

        for span in batch {
            let rendered = self.render(span);
            serde_json::to_writer_pretty(&mut *writer, &rendered)
                .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))?;
            writeln!(writer).map_err(|e| OTelSdkError::InternalFailure(e.to_string()))?;
        }

        writer
            .flush()
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))
    }

    fn render(&self, span: &SpanData) -> Value {
        let status = match &span.status {
            Status::Unset => json!({ "code": "Unset" }),
            Status::Ok => json!({ "code": "Ok" }),
            Status::Error { description } => {
                json!({ "code": "Error", "description": description.as_ref() })
            }
        };

        let events: Vec<Value> = span
            .events
            .events
            .iter()
            .map(|event| {
                json!({
                    "name": event.name.as_ref(),
                    "attributes": attributes(&event.attributes),
                })
            })
            .collect();

        let resource: Vec<Value> = self
            .resource
            .iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();

        json!({
            "name": span.name.as_ref(),
            "span_context": {
                "trace_id": span.span_context.trace_id().to_string(),
                "span_id": span.span_context.span_id().to_string(),
                "trace_flags": format!("{:02x}", span.span_context.trace_flags().to_u8()),
                "remote": span.span_context.is_remote(),
            },
            "parent_span_id": span.parent_span_id.to_string(),
            "kind": format!("{:?}", span.span_kind),
            "attributes": attributes(&span.attributes),
            "events": events,
            "status": status,
            "resource": resource,
            "instrumentation_scope": {
                "name": span.instrumentation_scope.name(),
                "version": span.instrumentation_scope.version(),
            },
        })
    }
}

fn attributes(attributes: &[KeyValue]) -> Vec<Value> {
    attributes
        .iter()
        .map(|kv| json!({ "key": kv.key.as_str(), "value": kv.value.to_string() }))
        .collect()
}

impl fmt::Debug for ConsoleExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleExporter")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

impl SpanExporter for ConsoleExporter {
    fn export(&self, batch: Vec<SpanData>) -> impl Future<Output = OTelSdkResult> + Send {
        std::future::ready(self.write_batch(&batch))
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.resource = resource
            .iter()
            .map(|(key, value)| (key.as_str().to_string(), value.to_string()))
            .collect();
    }
}
