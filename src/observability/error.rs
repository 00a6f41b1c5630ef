//! Errors raised while wiring telemetry.

use opentelemetry_sdk::error::OTelSdkError;

/// Error type for exporter construction, provider lifecycle and metric registration.
///
/// Everything except [`TelemetryError::Shutdown`] and [`TelemetryError::Encode`]
/// is a startup condition and treated as fatal.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("collector endpoint is empty; set OTEL_EXPORTER_OTLP_GRPC_ENDPOINT or use local export mode")]
    MissingCollectorEndpoint,

    #[error("collector endpoint {endpoint:?} is invalid: {reason}")]
    InvalidCollectorEndpoint { endpoint: String, reason: String },

    #[error("failed to build trace exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),

    #[error("metric {0:?} is already registered")]
    DuplicateMetric(&'static str),

    #[error("invalid histogram buckets: {0}")]
    Buckets(String),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] std::fmt::Error),

    #[error("trace provider shutdown failed: {0}")]
    Shutdown(#[source] OTelSdkError),
}
