//! weather-otel
//!
//! A small weather gateway that correlates request metrics with traces.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ request id ─▶ server span ─▶ /weather handler ─▶ client span ─▶ Weather Service
//!                                     │               │
//!                                     │               └─ counter + histogram (exemplar = span ids)
//!                                     └─ batch span processor ─▶ console | OTLP/gRPC collector
//!
//!     /metrics   OpenMetrics (with exemplars) or Prometheus text
//!     /healthz   {"status":"UP"}
//!     /readyz    {"status":"UP"}
//! ```

use std::path::PathBuf;

use clap::Parser;

use weather_otel::config::{self, loader, ServiceConfig};
use weather_otel::lifecycle::{self, Shutdown};
use weather_otel::observability::logging;

#[derive(Debug, Parser)]
#[command(name = "weather-otel", version, about)]
struct Cli {
    /// Optional TOML file applied underneath environment variables.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The log format depends on the resolved environment, so resolution
    // warnings go to a scoped stderr subscriber.
    let resolved = tracing::subscriber::with_default(logging::startup_subscriber(), || {
        match cli.config.as_deref() {
            Some(path) => config::load_config(Some(path), loader::process_env),
            None => Ok(ServiceConfig::from_env()),
        }
    });
    let config = match resolved {
        Ok(config) => config,
        Err(e) => {
            eprintln!("weather-otel: failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    logging::init_logging(&config.environment)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "weather-otel starting"
    );

    let app = match lifecycle::bootstrap(config).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    let shutdown = Shutdown::new();
    shutdown.spawn_signal_listener();

    app.run(shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
