//! Outbound HTTP client with trace propagation.
//!
//! # Responsibilities
//! - Start a client span as a child of the caller's context
//! - Inject W3C trace context and baggage into outbound headers
//! - Enforce a per-request timeout
//!
//! # Design Decisions
//! - No retries: one attempt per call, the caller maps the failure
//! - Timeouts are reported separately from other transport errors
//! - The span ends once response headers arrive

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_http::HeaderInjector;
use opentelemetry_sdk::trace::SdkTracer;
use opentelemetry_semantic_conventions::attribute as semconv;
use url::Url;

use crate::observability::TraceProvider;

/// Value of the `component` attribute on client spans.
pub const COMPONENT: &str = "opentracing-example";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClientError::Timeout { .. })
    }
}

/// `reqwest` wrapper that makes the downstream span a child of ours.
#[derive(Clone)]
pub struct PropagatingClient {
    http: reqwest::Client,
    tracer: SdkTracer,
    propagator: Arc<TextMapCompositePropagator>,
    timeout: Duration,
}

impl PropagatingClient {
    pub fn new(timeout: Duration, telemetry: &TraceProvider) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            http,
            tracer: telemetry.tracer().clone(),
            propagator: telemetry.propagator(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issue a single `GET` under a client span parented by `parent`.
    pub async fn get(&self, parent: &Context, url: Url) -> Result<reqwest::Response, ClientError> {
        let mut attributes = vec![
            KeyValue::new("component", COMPONENT),
            KeyValue::new(semconv::HTTP_REQUEST_METHOD, "GET"),
            KeyValue::new(semconv::URL_FULL, url.to_string()),
        ];
        if let Some(host) = url.host_str() {
            attributes.push(KeyValue::new(semconv::SERVER_ADDRESS, host.to_string()));
        }
        if let Some(port) = url.port_or_known_default() {
            attributes.push(KeyValue::new(semconv::SERVER_PORT, i64::from(port)));
        }

        let span = self
            .tracer
            .span_builder("GET")
            .with_kind(SpanKind::Client)
            .with_attributes(attributes)
            .start_with_context(&self.tracer, parent);
        let cx = parent.with_span(span);
        let span = cx.span();

        let mut request = self
            .http
            .get(url.clone())
            .build()
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })?;
        self.propagator
            .inject_context(&cx, &mut HeaderInjector(request.headers_mut()));

        tracing::debug!(url = %url, "Sending downstream request");

        match self.http.execute(request).await {
            Ok(response) => {
                let status = response.status();
                span.set_attribute(KeyValue::new(
                    semconv::HTTP_RESPONSE_STATUS_CODE,
                    i64::from(status.as_u16()),
                ));
                if status.is_server_error() {
                    span.set_status(Status::error(format!("downstream returned {status}")));
                }
                span.end();
                Ok(response)
            }
            Err(source) => {
                span.record_error(&source);
                span.set_status(Status::error(source.to_string()));
                span.end();

                if source.is_timeout() {
                    Err(ClientError::Timeout {
                        url: url.to_string(),
                        timeout: self.timeout,
                    })
                } else {
                    Err(ClientError::Transport {
                        url: url.to_string(),
                        source,
                    })
                }
            }
        }
    }
}

impl fmt::Debug for PropagatingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropagatingClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
