//! Configuration resolution from the environment and an optional file.

use std::fs;
use std::path::Path;

use crate::config::schema::{Environment, ExportMode, ServiceConfig};

pub const ENV_PORT: &str = "PORT";
pub const ENV_SERVICE_NAME: &str = "SERVICE_NAME";
pub const ENV_COLLECTOR_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_GRPC_ENDPOINT";
pub const ENV_EXPORT_MODE: &str = "OTEL_EXPORTER_OTLP_EXPORT_MODE";
pub const ENV_WEATHER_SERVICE_URL: &str = "WEATHER_SERVICE_URL";
pub const ENV_ENVIRONMENT: &str = "ENVIRONMENT";
pub const ENV_METRICS_EXEMPLARS: &str = "METRICS_EXEMPLARS";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ServiceConfig {
    /// Resolve configuration from environment lookups on top of defaults.
    ///
    /// Never fails: unparsable values fall back to their default with a warning.
    pub fn resolve<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = ServiceConfig::default();
        apply_env(&mut config, lookup);
        config
    }

    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        Self::resolve(process_env)
    }
}

/// Lookup that reads the real process environment.
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Load defaults, layer the optional TOML file, then apply environment overrides.
pub fn load_config<F>(path: Option<&Path>, lookup: F) -> Result<ServiceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
            toml::from_str(&content)?
        }
        None => ServiceConfig::default(),
    };

    apply_env(&mut config, lookup);
    Ok(config)
}

fn apply_env<F>(config: &mut ServiceConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup(ENV_PORT) {
        match port.trim().parse::<u16>() {
            Ok(port) => config.listener.port = port,
            Err(e) => tracing::warn!(
                value = %port,
                error = %e,
                default = config.listener.port,
                "Ignoring unparsable PORT"
            ),
        }
    }

    if let Some(name) = lookup(ENV_SERVICE_NAME) {
        config.telemetry.service_name = name;
    }

    if let Some(endpoint) = lookup(ENV_COLLECTOR_ENDPOINT) {
        config.telemetry.endpoint = endpoint;
    }

    if let Some(mode) = lookup(ENV_EXPORT_MODE) {
        config.telemetry.mode = ExportMode::from_setting(&mode);
    }

    if let Some(url) = lookup(ENV_WEATHER_SERVICE_URL) {
        config.weather.base_url = url;
    }

    if let Some(env) = lookup(ENV_ENVIRONMENT) {
        config.environment = Environment::from(env);
    }

    if let Some(flag) = lookup(ENV_METRICS_EXEMPLARS) {
        match parse_flag(&flag) {
            Some(enabled) => config.metrics.exemplars = enabled,
            None => tracing::warn!(value = %flag, "Ignoring unparsable METRICS_EXEMPLARS"),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
