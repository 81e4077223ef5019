//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! targets
//!     → dispatcher.rs (one task per target, batch deadline, completion-order fan-in)
//!     → worker.rs (permit → rate limit → breaker-guarded fetch → backoff → result)
//!     → FetchResult stream / Vec
//! ```
//!
//! # Design Decisions
//! - Workers are independent; one failing target never affects another's result
//! - The batch token is observed at every suspension point
//! - The dispatcher returns only after every worker has terminated

pub mod dispatcher;
mod worker;

pub use dispatcher::Dispatcher;
