//! Resilient concurrent HTTP fetch engine.

pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod lifecycle;
pub mod observability;
pub mod report;
pub mod resilience;

pub use config::schema::EngineConfig;
pub use dispatch::Dispatcher;
pub use fetch::{ErrorKind, FetchResult, Fetcher, HttpFetcher};
pub use lifecycle::Shutdown;
pub use report::Summary;
