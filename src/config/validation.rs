//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (rates > 0, thresholds > 0, timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::EngineConfig;

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check every semantic constraint and collect all violations.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let rps = config.rate_limit.requests_per_second;
    if !(rps.is_finite() && rps > 0.0) {
        errors.push(ValidationError::new(
            "rate_limit.requests_per_second",
            format!("must be a positive number, got {}", rps),
        ));
    }
    if config.rate_limit.burst_size == 0 {
        errors.push(ValidationError::new("rate_limit.burst_size", "must be at least 1"));
    }

    if let Some(max) = config.retries.max_delay_ms {
        if max < config.retries.base_delay_ms {
            errors.push(ValidationError::new(
                "retries.max_delay_ms",
                format!("must not be below base_delay_ms ({})", config.retries.base_delay_ms),
            ));
        }
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be at least 1"));
    }
    if config.circuit_breaker.open_duration_ms == 0 {
        errors.push(ValidationError::new("circuit_breaker.open_duration_ms", "must be greater than 0"));
    }

    if config.dispatch.max_concurrency == Some(0) {
        errors.push(ValidationError::new("dispatch.max_concurrency", "must be at least 1 when set"));
    }
    if config.dispatch.batch_timeout_secs == 0 {
        errors.push(ValidationError::new("dispatch.batch_timeout_secs", "must be greater than 0"));
    }

    let transport = &config.transport;
    for (field, value) in [
        ("transport.connect_timeout_ms", transport.connect_timeout_ms),
        ("transport.request_timeout_ms", transport.request_timeout_ms),
        ("transport.read_timeout_ms", transport.read_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
