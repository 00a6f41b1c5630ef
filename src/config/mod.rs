//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → optional TOML file (loader.rs)
//!     → environment overrides (loader.rs)
//!     → validation.rs (semantic checks, fatal at startup)
//!     → ServiceConfig (immutable, shared by value/Arc)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved; there is no reload
//! - All fields have defaults, absence of a variable is never an error
//! - A variable that is set but empty still counts as provided

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BatchConfig, Environment, ExportMode, ListenerConfig, MetricsConfig, PingConfig,
    ServiceConfig, TelemetryConfig, WeatherConfig,
};
pub use validation::{validate_config, ValidationError};
