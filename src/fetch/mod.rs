//! Fetch subsystem.
//!
//! # Data Flow
//! ```text
//! target URL
//!     → client.rs (one GET over the pooled transport, body counted under a deadline)
//!     → result.rs (FetchResult with status, size, elapsed, or a classified ErrorKind)
//! ```

pub mod client;
pub mod result;

pub use client::{Fetcher, HttpFetcher};
pub use result::{ErrorKind, FetchResult};
