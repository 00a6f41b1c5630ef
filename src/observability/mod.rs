//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     exporter.rs (console or OTLP/gRPC)
//!         → tracing.rs (provider, sampler, batch processor, propagator)
//!     metrics.rs (counter + histogram, exemplar capability fixed here)
//!     logging.rs (subscriber, format by environment)
//!
//! Per request:
//!     tracing.rs extract → server span → metrics.rs record with exemplar
//!     tracing.rs inject → outbound headers
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing in production
//! - Metrics are cheap (atomic increments behind a label map)
//! - Span export is batched off the request path

pub mod error;
pub mod exporter;
pub mod logging;
pub mod metrics;
pub mod tracing;

pub use self::error::TelemetryError;
pub use self::exporter::{build_exporter, ConsoleExporter, TraceExporter};
pub use self::metrics::{
    Exemplar, ExemplarSupport, Exposition, HttpMetrics, MetricsRegistry, RequestLabels, Route,
};
pub use self::tracing::TraceProvider;
