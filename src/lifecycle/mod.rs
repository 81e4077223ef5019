//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Root cancellation token → child token per batch
//!
//! Signals (signals.rs):
//!     SIGINT → Trigger shutdown → running batch reports pending targets as cancelled
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
