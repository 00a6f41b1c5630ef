//! Server span middleware.
//!
//! Extracts W3C context from the incoming headers, starts a server span named
//! `{method} {route}`, and hands the resulting [`Context`] to handlers through
//! the [`RequestTrace`] extractor. The span is ended after the handler's
//! response is built, carrying the final status code.
//!
//! Layered onto individual handlers, so only matched application routes
//! with a supported method are traced.

use std::convert::Infallible;

use axum::extract::{FromRequestParts, MatchedPath, Request, State};
use axum::http::{header, request::Parts};
use axum::middleware::Next;
use axum::response::Response;
use opentelemetry::context::FutureExt as _;
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::attribute as semconv;
use tracing::Instrument;

use crate::http::request::request_id;
use crate::http::server::AppState;

/// Trace context of the current request, as seen by handlers.
///
/// Defaults to an empty context when the middleware did not run.
#[derive(Debug, Clone, Default)]
pub struct RequestTrace(pub Context);

impl<S> FromRequestParts<S> for RequestTrace
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestTrace>()
            .cloned()
            .unwrap_or_default())
    }
}

pub async fn trace_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let method = request.method().clone();

    let mut attributes = vec![
        KeyValue::new(semconv::HTTP_REQUEST_METHOD, method.to_string()),
        KeyValue::new(semconv::HTTP_ROUTE, route.clone()),
        KeyValue::new(semconv::URL_PATH, path.clone()),
        KeyValue::new(semconv::URL_SCHEME, "http"),
    ];
    if let Some(query) = request.uri().query() {
        attributes.push(KeyValue::new(semconv::URL_QUERY, query.to_string()));
    }
    if let Some(agent) = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    {
        attributes.push(KeyValue::new(semconv::USER_AGENT_ORIGINAL, agent.to_string()));
    }

    let parent = state.telemetry.extract(request.headers());
    let tracer = state.telemetry.tracer();
    let span = tracer
        .span_builder(format!("{method} {route}"))
        .with_kind(SpanKind::Server)
        .with_attributes(attributes)
        .start_with_context(tracer, &parent);
    let cx = parent.with_span(span);

    let span_context = cx.span().span_context().clone();
    let log_span = tracing::info_span!(
        "http_request",
        trace_id = %span_context.trace_id(),
        span_id = %span_context.span_id(),
        path = %path,
        request_id = request_id(request.headers()).unwrap_or_default(),
    );

    request.extensions_mut().insert(RequestTrace(cx.clone()));

    let response = next
        .run(request)
        .with_context(cx.clone())
        .instrument(log_span)
        .await;

    let status = response.status();
    let span = cx.span();
    span.set_attribute(KeyValue::new(
        semconv::HTTP_RESPONSE_STATUS_CODE,
        i64::from(status.as_u16()),
    ));
    if status.is_server_error() {
        span.set_status(Status::error(status.to_string()));
    }
    span.end();

    response
}
