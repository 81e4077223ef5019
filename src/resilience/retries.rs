//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a failed attempt is retryable
//! - Report the backoff delay before the next attempt
//!
//! # Design Decisions
//! - The policy never sleeps; callers perform the wait and can abandon it
//! - Connection, timeout and read errors always retryable; 5xx configurable
//! - Cancellation, open circuits and malformed requests are never retried

use std::time::Duration;

use crate::config::RetryConfig;
use crate::fetch::ErrorKind;
use crate::resilience::backoff::{calculate_backoff, with_jitter};

/// Decides whether and when a failed attempt is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Option<Duration>,
    jitter: bool,
    retry_server_errors: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: None,
            jitter: false,
            retry_server_errors: true,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            jitter: config.jitter,
            retry_server_errors: config.retry_server_errors,
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// `attempt` counts the retries already performed (0 after the initial call).
    pub fn should_retry(&self, attempt: u32, error: ErrorKind) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        match error {
            ErrorKind::ServerError => self.retry_server_errors,
            other => other.is_retryable(),
        }
    }

    /// True once at least one retry happened and the ceiling is reached.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt > 0 && attempt >= self.max_retries
    }

    /// Wait before retry number `attempt` (1 for the first retry).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = calculate_backoff(attempt, self.base_delay, self.max_delay);
        if self.jitter {
            with_jitter(delay)
        } else {
            delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
