//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, HTTP logging)
//!     → middleware/trace_context.rs (extract context, server span)
//!     → handlers.rs (correlator begin → domain logic → complete)
//!     → Send to client, server span ends
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod server;

pub use middleware::RequestTrace;
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
