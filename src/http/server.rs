//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request id, HTTP logging, server spans)
//! - Serve on a bound listener until shutdown is signalled
//!
//! # Design Decisions
//! - Only `/weather` and `/ping` are traced and counted
//! - Health, readiness and scrape endpoints stay outside the span layer

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::handler::Handler;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::correlation::RequestCorrelator;
use crate::http::handlers;
use crate::http::middleware::trace_context;
use crate::http::request::UuidRequestId;
use crate::observability::{HttpMetrics, TraceProvider};
use crate::weather::WeatherService;

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub telemetry: Arc<TraceProvider>,
    pub metrics: Arc<HttpMetrics>,
    pub correlator: RequestCorrelator,
    pub weather: WeatherService,
    pub ping_max_delay: Duration,
}

impl AppState {
    pub fn new(
        config: &ServiceConfig,
        telemetry: Arc<TraceProvider>,
        metrics: Arc<HttpMetrics>,
        weather: WeatherService,
    ) -> Self {
        Self {
            correlator: RequestCorrelator::new(metrics.clone()),
            telemetry,
            metrics,
            weather,
            ping_max_delay: Duration::from_millis(config.ping.max_delay_ms),
        }
    }
}

/// HTTP server for the weather service.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The span layer wraps each traced handler, not the route, so requests
    /// rejected by method routing (405) get neither a span nor a count.
    fn build_router(state: AppState) -> Router {
        let traced = middleware::from_fn_with_state(state.clone(), trace_context);

        Router::new()
            .route("/weather", get(handlers::weather.layer(traced.clone())))
            .route("/ping", get(handlers::ping.layer(traced)))
            .route("/metrics", get(handlers::metrics))
            .route("/healthz", get(handlers::healthz))
            .route("/readyz", get(handlers::readyz))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Serve until a value arrives on `shutdown`, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
