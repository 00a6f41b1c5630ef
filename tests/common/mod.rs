//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opentelemetry_sdk::trace::{InMemorySpanExporter, SpanData};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use weather_otel::config::ServiceConfig;
use weather_otel::lifecycle::bootstrap_with;
use weather_otel::observability::TraceProvider;
use weather_otel::Shutdown;

pub const HELSINKI: &str = r#"{"message":"ok","address":"Helsinki","temperature":5.0,"windSpeed":3.0,"weatherSymbol":"cloudy"}"#;

pub const OPENMETRICS_ACCEPT: &str = "application/openmetrics-text;version=1.0.0,text/plain;version=0.0.4;q=0.5,*/*;q=0.1";

/// A raw-TCP backend that records every request head it receives.
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    heads: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Lowercased request heads, in arrival order.
    pub fn heads(&self) -> Vec<String> {
        self.heads.lock().unwrap().clone()
    }

    pub fn header(&self, index: usize, name: &str) -> Option<String> {
        let prefix = format!("{}: ", name.to_lowercase());
        self.heads()
            .get(index)?
            .lines()
            .find_map(|l| l.strip_prefix(&prefix).map(|v| v.trim().to_string()))
    }
}

/// Start a programmable mock backend; `f` decides status and body per request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);
    let hits = Arc::new(AtomicUsize::new(0));
    let heads = Arc::new(Mutex::new(Vec::new()));

    let backend = MockBackend {
        addr,
        hits: hits.clone(),
        heads: heads.clone(),
    };

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let f = f.clone();
                    let heads = heads.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        heads.lock().unwrap().push(head);

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    backend
}

/// A backend that answers every request with `body` after `delay`.
pub async fn start_backend(status: u16, body: &'static str, delay: Duration) -> MockBackend {
    start_programmable_backend(move || async move {
        tokio::time::sleep(delay).await;
        (status, body.to_string())
    })
    .await
}

/// A backend that sends the response head at once and the body after `stall`.
pub async fn start_stalled_body_backend(body: &'static str, stall: Duration) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        hits: Arc::new(AtomicUsize::new(0)),
        heads: Arc::new(Mutex::new(Vec::new())),
    };
    let hits = backend.hits.clone();
    let heads = backend.heads.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            hits.fetch_add(1, Ordering::SeqCst);
            let heads = heads.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                heads.lock().unwrap().push(head);

                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.flush().await;
                tokio::time::sleep(stall).await;
                let _ = socket.write_all(body.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    backend
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = [0u8; 4096];
    let mut head = Vec::new();
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).to_lowercase()
}

/// A running service instance with in-memory span capture.
pub struct TestApp {
    pub addr: SocketAddr,
    pub exporter: InMemorySpanExporter,
    pub telemetry: Arc<TraceProvider>,
    pub shutdown: Shutdown,
    pub client: reqwest::Client,
    pub server: tokio::task::JoinHandle<std::io::Result<()>>,
}

pub async fn spawn_app<F>(weather_url: &str, configure: F) -> TestApp
where
    F: FnOnce(&mut ServiceConfig),
{
    let mut config = ServiceConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    config.weather.base_url = weather_url.to_string();
    config.ping.max_delay_ms = 10;
    configure(&mut config);

    let exporter = InMemorySpanExporter::default();
    let telemetry = Arc::new(TraceProvider::with_exporter(
        exporter.clone(),
        &config.telemetry,
    ));

    let app = bootstrap_with(config, telemetry.clone()).await.unwrap();
    let addr = app.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let server = tokio::spawn(app.run(receiver));

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestApp {
        addr,
        exporter,
        telemetry,
        shutdown,
        client,
        server,
    }
}

impl TestApp {
    pub fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }

    pub async fn get(&self, path_and_query: &str) -> reqwest::Response {
        self.client
            .get(self.url(path_and_query))
            .send()
            .await
            .expect("service unreachable")
    }

    /// Scrape `/metrics` the way Prometheus does, asking for OpenMetrics first.
    pub async fn scrape(&self) -> String {
        self.scrape_with(OPENMETRICS_ACCEPT).await.text().await.unwrap()
    }

    pub async fn scrape_with(&self, accept: &str) -> reqwest::Response {
        self.client
            .get(self.url("/metrics"))
            .header("accept", accept)
            .send()
            .await
            .expect("service unreachable")
    }

    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.telemetry.force_flush().unwrap();
        self.exporter.get_finished_spans().unwrap()
    }
}

/// Sample lines of `name` whose labels include every `key="value"` pair.
pub fn samples<'a>(body: &'a str, name: &str, labels: &[(&str, &str)]) -> Vec<&'a str> {
    let prefix = format!("{name}{{");
    body.lines()
        .filter(|l| l.starts_with(&prefix))
        .filter(|l| {
            labels
                .iter()
                .all(|(k, v)| l.contains(&format!("{k}=\"{v}\"")))
        })
        .collect()
}

/// Numeric value of a sample line, ignoring any trailing exemplar.
pub fn value(line: &str) -> f64 {
    let sample = line.split(" # ").next().unwrap();
    sample
        .rsplit_once('}')
        .map_or(sample, |(_, rest)| rest)
        .split_whitespace()
        .next()
        .unwrap()
        .parse()
        .unwrap()
}

/// `(trace_id, span_id)` of the exemplar on a sample line.
pub fn exemplar(line: &str) -> Option<(String, String)> {
    let (_, exemplar) = line.split_once(" # ")?;
    let label = |key: &str| {
        let start = exemplar.find(&format!("{key}=\""))? + key.len() + 2;
        let end = exemplar[start..].find('"')? + start;
        Some(exemplar[start..end].to_string())
    };
    Some((label("trace_id")?, label("span_id")?))
}

/// Split a `traceparent` header into `(trace_id, parent_span_id)`.
pub fn traceparent_ids(header: &str) -> (String, String) {
    let parts: Vec<&str> = header.split('-').collect();
    assert_eq!(parts.len(), 4, "malformed traceparent {header}");
    (parts[1].to_string(), parts[2].to_string())
}
