//! Weather lookup against the downstream service.
//!
//! # Responsibilities
//! - Validate the `longitude` / `latitude` query
//! - Build the downstream URL and call it through [`PropagatingClient`]
//! - Decode the downstream body and map failures to one status each
//!
//! # Design Decisions
//! - Coordinates are forwarded exactly as received once they parse as finite numbers
//! - A downstream 5xx or 4xx is not decoded; it is reported as 502

use std::time::Duration;

use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use opentelemetry::Context;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::{ClientError, PropagatingClient};

pub const MSG_MISSING: &str = "Missing longitude or latitude";
pub const MSG_INVALID: &str = "Invalid longitude or latitude";
pub const MSG_FETCH: &str = "Error fetching weather";
pub const MSG_UPSTREAM: &str = "Weather service returned an error";
pub const MSG_DECODE: &str = "Error decoding response body";

/// Downstream weather report, mirrored back to the caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Weather {
    pub message: String,
    pub address: String,
    pub temperature: f64,
    pub wind_speed: f64,
    pub weather_symbol: String,
}

/// Raw `/weather` query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeatherQuery {
    pub longitude: Option<String>,
    pub latitude: Option<String>,
}

/// Validated coordinates, kept in their original textual form.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinates {
    longitude: String,
    latitude: String,
}

impl Coordinates {
    pub fn longitude(&self) -> &str {
        &self.longitude
    }

    pub fn latitude(&self) -> &str {
        &self.latitude
    }
}

impl WeatherQuery {
    pub fn coordinates(&self) -> Result<Coordinates, WeatherError> {
        let longitude = present(self.longitude.as_deref()).ok_or(WeatherError::MissingCoordinates)?;
        let latitude = present(self.latitude.as_deref()).ok_or(WeatherError::MissingCoordinates)?;

        if !is_coordinate(longitude) || !is_coordinate(latitude) {
            return Err(WeatherError::InvalidCoordinates);
        }

        Ok(Coordinates {
            longitude: longitude.to_string(),
            latitude: latitude.to_string(),
        })
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_coordinate(value: &str) -> bool {
    value.parse::<f64>().is_ok_and(f64::is_finite)
}

/// Per-request failures of the weather flow.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("longitude or latitude missing from query")]
    MissingCoordinates,

    #[error("longitude or latitude is not a number")]
    InvalidCoordinates,

    #[error("weather request failed: {0}")]
    Fetch(#[from] ClientError),

    #[error("weather service responded with {0}")]
    Upstream(StatusCode),

    #[error("weather response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

impl WeatherError {
    pub fn status(&self) -> StatusCode {
        match self {
            WeatherError::MissingCoordinates | WeatherError::InvalidCoordinates => {
                StatusCode::BAD_REQUEST
            }
            WeatherError::Fetch(_) | WeatherError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WeatherError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            WeatherError::MissingCoordinates => MSG_MISSING,
            WeatherError::InvalidCoordinates => MSG_INVALID,
            WeatherError::Fetch(_) => MSG_FETCH,
            WeatherError::Upstream(_) => MSG_UPSTREAM,
            WeatherError::Decode(_) => MSG_DECODE,
        }
    }
}

impl IntoResponse for WeatherError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(serde_json::json!({ "message": self.message() })),
        )
            .into_response()
    }
}

/// Client for `{base}/weather`.
#[derive(Debug, Clone)]
pub struct WeatherService {
    base: Url,
    client: PropagatingClient,
}

impl WeatherService {
    pub fn new(base: Url, client: PropagatingClient) -> Self {
        Self { base, client }
    }

    /// `{base}/weather?longitude=..&latitude=..`, keeping any base path.
    pub fn url_for(&self, coordinates: &Coordinates) -> Url {
        let mut url = self.base.clone();
        let path = format!("{}/weather", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .clear()
            .append_pair("longitude", coordinates.longitude())
            .append_pair("latitude", coordinates.latitude());
        url
    }

    /// One downstream call under `cx`. Never retried.
    pub async fn fetch(&self, cx: &Context, coordinates: &Coordinates) -> Result<Weather, WeatherError> {
        let url = self.url_for(coordinates);
        let response = self.client.get(cx, url.clone()).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::Upstream(status));
        }

        // the client timeout also bounds the body read
        response.json::<Weather>().await.map_err(|e| {
            if e.is_timeout() {
                WeatherError::Fetch(ClientError::Timeout {
                    url: url.to_string(),
                    timeout: self.client.timeout(),
                })
            } else {
                WeatherError::Decode(e)
            }
        })
    }

    /// Timeout applied to each downstream call.
    pub fn timeout(&self) -> Duration {
        self.client.timeout()
    }
}
