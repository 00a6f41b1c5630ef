//! Configuration schema definitions.
//!
//! All types derive Serde traits so the same schema can be read from an
//! optional TOML file before environment overrides are applied.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::client;

/// Service name reported when `SERVICE_NAME` is not set.
pub const DEFAULT_SERVICE_NAME: &str = "02-tracing-rust";

/// Collector address used when `OTEL_EXPORTER_OTLP_GRPC_ENDPOINT` is not set.
pub const DEFAULT_COLLECTOR_ENDPOINT: &str = "localhost:4317";

/// Downstream weather service used when `WEATHER_SERVICE_URL` is not set.
pub const DEFAULT_WEATHER_SERVICE_URL: &str = "http://localhost:8080";

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Trace export settings.
    pub telemetry: TelemetryConfig,

    /// Request metrics settings.
    pub metrics: MetricsConfig,

    /// Downstream weather service.
    pub weather: WeatherConfig,

    /// `/ping` handler behaviour.
    pub ping: PingConfig,

    /// Deployment environment, controls log format.
    pub environment: Environment,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub host: String,

    /// TCP port (`PORT`).
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ListenerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which trace exporter the process installs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum ExportMode {
    /// Human-readable console output.
    Local,
    /// OTLP/gRPC export to a collector.
    #[default]
    Collector,
}

impl ExportMode {
    /// Interpret a raw mode setting. Anything that is not a console alias,
    /// including the empty string, selects the collector.
    pub fn from_setting(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "stdout" | "console" => ExportMode::Local,
            _ => ExportMode::Collector,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportMode::Local => "local",
            ExportMode::Collector => "collector",
        }
    }
}

impl From<String> for ExportMode {
    fn from(value: String) -> Self {
        ExportMode::from_setting(&value)
    }
}

impl From<ExportMode> for String {
    fn from(mode: ExportMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trace export configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Exporter selection (`OTEL_EXPORTER_OTLP_EXPORT_MODE`).
    pub mode: ExportMode,

    /// Collector endpoint (`OTEL_EXPORTER_OTLP_GRPC_ENDPOINT`). May be empty.
    pub endpoint: String,

    /// `service.name` resource attribute (`SERVICE_NAME`).
    pub service_name: String,

    /// Batch span processor tuning.
    pub batch: BatchConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            mode: ExportMode::Collector,
            endpoint: DEFAULT_COLLECTOR_ENDPOINT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            batch: BatchConfig::default(),
        }
    }
}

/// Batch span processor settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// Spans buffered before new ones are dropped.
    pub max_queue_size: usize,

    /// Spans sent per export call.
    pub max_export_batch_size: usize,

    /// Delay between scheduled exports, in milliseconds.
    pub scheduled_delay_ms: u64,

    /// Exporter timeout for each OTLP call, in seconds.
    pub export_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 2048,
            max_export_batch_size: 512,
            scheduled_delay_ms: 5000,
            export_timeout_secs: 10,
        }
    }
}

impl BatchConfig {
    pub fn scheduled_delay(&self) -> Duration {
        Duration::from_millis(self.scheduled_delay_ms)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }
}

/// Request metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Attach trace exemplars and expose OpenMetrics (`METRICS_EXEMPLARS`).
    pub exemplars: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { exemplars: true }
    }
}

/// Downstream weather service configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WeatherConfig {
    /// Base URL of the weather service (`WEATHER_SERVICE_URL`).
    pub base_url: String,

    /// Outbound call timeout in milliseconds, [`client::DEFAULT_TIMEOUT`] unless set.
    pub timeout_ms: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WEATHER_SERVICE_URL.to_string(),
            timeout_ms: client::DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl WeatherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// `/ping` configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PingConfig {
    /// Upper bound for the simulated work delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self { max_delay_ms: 1000 }
    }
}

/// Deployment environment (`ENVIRONMENT`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Other(String),
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl From<String> for Environment {
    fn from(value: String) -> Self {
        match value.as_str() {
            "development" => Environment::Development,
            "production" => Environment::Production,
            _ => Environment::Other(value),
        }
    }
}

impl From<Environment> for String {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => "development".to_string(),
            Environment::Production => "production".to_string(),
            Environment::Other(value) => value,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
            Environment::Other(value) => f.write_str(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_mode_aliases() {
        assert_eq!(ExportMode::from_setting("local"), ExportMode::Local);
        assert_eq!(ExportMode::from_setting("stdout"), ExportMode::Local);
        assert_eq!(ExportMode::from_setting(" Console "), ExportMode::Local);
        assert_eq!(ExportMode::from_setting(""), ExportMode::Collector);
        assert_eq!(ExportMode::from_setting("otlp"), ExportMode::Collector);
    }

    #[test]
    fn toml_overrides_nested_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            environment = "production"

            [telemetry]
            mode = "stdout"
            service_name = "from-file"

            [weather]
            timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.telemetry.mode, ExportMode::Local);
        assert_eq!(config.telemetry.service_name, "from-file");
        assert_eq!(config.telemetry.endpoint, DEFAULT_COLLECTOR_ENDPOINT);
        assert_eq!(config.weather.timeout(), Duration::from_millis(250));
        assert_eq!(config.weather.base_url, DEFAULT_WEATHER_SERVICE_URL);
        assert!(config.environment.is_production());
        assert_eq!(config.listener.port, 8080);
    }
}
