//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check the downstream URL before any request depends on it
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - The collector endpoint is not checked here; the exporter factory owns that rule

use url::Url;

use crate::config::schema::ServiceConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener port must be non-zero")]
    ZeroPort,
    #[error("service name must not be empty")]
    EmptyServiceName,
    #[error("weather service URL {url:?} is invalid: {reason}")]
    InvalidWeatherUrl { url: String, reason: String },
    #[error("weather timeout must be greater than zero")]
    ZeroWeatherTimeout,
    #[error("batch queue size must be greater than zero")]
    ZeroQueueSize,
}

/// Check a resolved configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }

    if config.telemetry.service_name.trim().is_empty() {
        errors.push(ValidationError::EmptyServiceName);
    }

    if let Err(reason) = check_http_url(&config.weather.base_url) {
        errors.push(ValidationError::InvalidWeatherUrl {
            url: config.weather.base_url.clone(),
            reason,
        });
    }

    if config.weather.timeout_ms == 0 {
        errors.push(ValidationError::ZeroWeatherTimeout);
    }

    if config.telemetry.batch.max_queue_size == 0 {
        errors.push(ValidationError::ZeroQueueSize);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_http_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme {other:?}")),
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}
