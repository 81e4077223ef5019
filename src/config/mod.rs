//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or defaults
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI overrides (binary only)
//!     → EngineConfig (validated, immutable)
//!     → handed to the Dispatcher at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable for the lifetime of a batch
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::BreakerScope;
pub use schema::CircuitBreakerConfig;
pub use schema::DispatchConfig;
pub use schema::EngineConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::RateLimitConfig;
pub use schema::RetryConfig;
pub use schema::TransportConfig;
pub use validation::{validate_config, ValidationError};
