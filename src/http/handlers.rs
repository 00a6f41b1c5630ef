//! Route handlers.

use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::Rng;
use serde_json::{json, Value};

use crate::http::middleware::RequestTrace;
use crate::http::server::AppState;
use crate::observability::Route;
use crate::weather::{WeatherError, WeatherQuery};

/// `GET /weather?longitude=..&latitude=..`
///
/// Every outcome, including rejected queries, is recorded once.
pub async fn weather(
    State(state): State<AppState>,
    RequestTrace(cx): RequestTrace,
    method: Method,
    query: Result<Query<WeatherQuery>, QueryRejection>,
) -> Response {
    let in_flight = state.correlator.begin(&cx, &method, Route::WEATHER);

    let result = match query {
        Ok(Query(query)) => match query.coordinates() {
            Ok(coordinates) => state.weather.fetch(&cx, &coordinates).await,
            Err(e) => Err(e),
        },
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Unparsable weather query");
            Err(WeatherError::InvalidCoordinates)
        }
    };

    let response = match result {
        Ok(weather) => {
            tracing::info!(address = %weather.address, "Weather fetched");
            (StatusCode::OK, Json(weather)).into_response()
        }
        Err(e) => {
            tracing::warn!(error = %e, status = e.status().as_u16(), "{}", e.message());
            e.into_response()
        }
    };

    in_flight.complete(response.status());
    response
}

/// `GET /ping`, answers after a random delay.
pub async fn ping(
    State(state): State<AppState>,
    RequestTrace(cx): RequestTrace,
    method: Method,
) -> Response {
    let in_flight = state.correlator.begin(&cx, &method, Route::PING);

    let delay = random_delay(state.ping_max_delay);
    tracing::debug!(delay_ms = delay.as_millis() as u64, "Sleeping before pong");
    tokio::time::sleep(delay).await;

    let response = Json(json!({ "message": "pong" })).into_response();
    in_flight.complete(response.status());
    response
}

fn random_delay(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "UP" }))
}

pub async fn readyz() -> Json<Value> {
    Json(json!({ "status": "UP" }))
}

/// Scrape endpoint. OpenMetrics with exemplars when the scraper accepts it,
/// Prometheus text otherwise.
pub async fn metrics(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());

    match state.metrics.scrape(accept) {
        Ok((format, body)) => ([(header::CONTENT_TYPE, format.content_type())], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
