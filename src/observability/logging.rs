//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber once per process
//! - Pick the output format from the resolved deployment environment
//!
//! # Design Decisions
//! - JSON format for production, human-readable format otherwise
//! - Level filter from `RUST_LOG`, falling back to [`DEFAULT_FILTER`]
//! - Request spans carry `trace_id` and `span_id` so log lines join traces

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Environment;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "weather_otel=info,tower_http=info";

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_logging(environment: &Environment) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter());

    if environment.is_production() {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    }
}

/// Plain stderr subscriber for the window before configuration is resolved.
///
/// Scoped with `tracing::subscriber::with_default`, so [`init_logging`] can
/// still install the global subscriber afterwards.
pub fn startup_subscriber() -> impl tracing::Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter())
        .finish()
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
