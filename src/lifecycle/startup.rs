//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build the exporter, trace provider and metrics in dependency order
//! - Bind the listener last, so traffic arrives only when ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The trace provider is shut down after the server drains, whatever the outcome

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use url::Url;

use crate::client::{ClientError, PropagatingClient};
use crate::config::{validate_config, ServiceConfig, ValidationError};
use crate::http::{AppState, HttpServer};
use crate::observability::{build_exporter, HttpMetrics, TelemetryError, TraceProvider};
use crate::weather::WeatherService;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join(.0))]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("invalid weather service URL: {0}")]
    WeatherUrl(#[from] url::ParseError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A fully wired service, bound but not yet serving.
#[derive(Debug)]
pub struct Application {
    telemetry: Arc<TraceProvider>,
    state: AppState,
    listener: TcpListener,
}

/// Validate `config`, install its exporter, then wire the service.
pub async fn bootstrap(config: ServiceConfig) -> Result<Application, StartupError> {
    validate_config(&config).map_err(StartupError::Invalid)?;

    let exporter = build_exporter(&config.telemetry)?;
    let telemetry = Arc::new(TraceProvider::init(exporter, &config.telemetry));

    bootstrap_with(config, telemetry).await
}

/// Wire the service around an already-installed trace provider.
pub async fn bootstrap_with(
    config: ServiceConfig,
    telemetry: Arc<TraceProvider>,
) -> Result<Application, StartupError> {
    let metrics = Arc::new(HttpMetrics::register(config.metrics.exemplars.into())?);
    let client = PropagatingClient::new(config.weather.timeout(), &telemetry)?;
    let base = Url::parse(&config.weather.base_url)?;
    let weather = WeatherService::new(base, client);

    let state = AppState::new(&config, telemetry.clone(), metrics, weather);

    let address = config.listener.bind_address();
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(source) => return Err(StartupError::Bind { address, source }),
    };
    let local_addr = listener
        .local_addr()
        .map_err(|source| StartupError::Bind { address, source })?;

    tracing::info!(
        address = %local_addr,
        service_name = %config.telemetry.service_name,
        export_mode = %config.telemetry.mode,
        weather_service = %config.weather.base_url,
        "Listening for connections"
    );

    Ok(Application {
        telemetry,
        state,
        listener,
    })
}

impl Application {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn telemetry(&self) -> Arc<TraceProvider> {
        self.telemetry.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` fires, then flush and close the trace provider.
    pub async fn run(self, shutdown: broadcast::Receiver<()>) -> io::Result<()> {
        let server = HttpServer::new(self.state);
        let result = server.run(self.listener, shutdown).await;

        if let Err(e) = self.telemetry.shutdown() {
            tracing::warn!(error = %e, "Trace provider shutdown failed");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportMode;

    #[tokio::test]
    async fn empty_collector_endpoint_is_fatal() {
        let mut config = ServiceConfig::default();
        config.telemetry.mode = ExportMode::Collector;
        config.telemetry.endpoint = String::new();

        let err = bootstrap(config).await.unwrap_err();
        assert!(matches!(
            err,
            StartupError::Telemetry(TelemetryError::MissingCollectorEndpoint)
        ));
    }

    #[tokio::test]
    async fn validation_errors_are_reported_together() {
        let mut config = ServiceConfig::default();
        config.weather.base_url = "not a url".into();
        config.weather.timeout_ms = 0;

        match bootstrap(config).await.unwrap_err() {
            StartupError::Invalid(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn default_weather_timeout_reaches_the_client() {
        let mut config = ServiceConfig::default();
        config.listener.host = "127.0.0.1".into();
        config.listener.port = 0;
        let telemetry = Arc::new(TraceProvider::with_exporter(
            opentelemetry_sdk::trace::InMemorySpanExporter::default(),
            &config.telemetry,
        ));

        let app = bootstrap_with(config, telemetry.clone()).await.unwrap();
        assert_eq!(app.state().weather.timeout(), crate::client::DEFAULT_TIMEOUT);
        assert_eq!(app.state().weather.timeout(), std::time::Duration::from_secs(10));
        assert!(Arc::ptr_eq(&app.telemetry(), &telemetry));
    }

    #[tokio::test]
    async fn bind_conflict_is_fatal() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = ServiceConfig::default();
        config.listener.host = "127.0.0.1".into();
        config.listener.port = taken.local_addr().unwrap().port();
        config.telemetry.mode = ExportMode::Local;

        let err = bootstrap(config).await.unwrap_err();
        assert!(matches!(err, StartupError::Bind { .. }));
    }
}
