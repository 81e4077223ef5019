//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Workers, breakers and the rate limiter produce:
//!     → logging.rs (structured log events, one span per target)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stderr (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
