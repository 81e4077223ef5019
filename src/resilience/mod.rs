//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Per target:
//!     → rate_limit.rs (wait for a batch-wide token)
//!     → registry.rs (find the breaker for the target's endpoint)
//!     → circuit_breaker.rs (fail fast, or run the attempt and track its outcome)
//!     → On failure: retries.rs (retryable? how long to wait, via backoff.rs)
//! ```
//!
//! # Design Decisions
//! - Every wait observes the batch cancellation token
//! - Circuit breaker prevents hammering unhealthy endpoints
//! - All shared state sits behind a mutex; no global state

pub mod backoff;
pub mod circuit_breaker;
pub mod rate_limit;
pub mod registry;
pub mod retries;

pub use circuit_breaker::{CallOutcome, CircuitBreaker, CircuitOpen, CircuitState, Verdict};
pub use rate_limit::{Cancelled, RateLimiter};
pub use registry::BreakerRegistry;
pub use retries::RetryPolicy;
