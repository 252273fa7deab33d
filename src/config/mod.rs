//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or CLI/env overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks: upstream URL, retry bounds)
//!     → ProxyConfig (validated, immutable)
//!     → consumed once by the server shell at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults except the upstream URL, which is required
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ListenerConfig, ProxyConfig, RetryConfig, TimeoutConfig, UpstreamConfig};
pub use validation::{validate_config, ValidationError};
