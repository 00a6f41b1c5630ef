//! Weather service with correlated metrics and distributed tracing.

pub mod client;
pub mod config;
pub mod correlation;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod weather;

pub use self::config::ServiceConfig;
pub use self::http::HttpServer;
pub use self::lifecycle::Shutdown;
