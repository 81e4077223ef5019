//! Per-target outcome records and failure classification.

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::resilience::circuit_breaker::{CallOutcome, Verdict};

/// Why a fetch did not produce a usable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// DNS resolution or TCP/TLS connect failed.
    Connection,
    /// The per-request deadline elapsed.
    Timeout,
    /// A response arrived but reading its body failed.
    Read,
    /// The batch was cancelled or timed out before this request finished.
    Cancelled,
    /// The circuit breaker rejected the call without touching the network.
    CircuitOpen,
    /// The target could not be turned into a request (bad URL, bad scheme).
    InvalidRequest,
    /// The endpoint answered with a 5xx status.
    ServerError,
    /// The worker for this target panicked before producing a result.
    Internal,
}

impl ErrorKind {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorKind::Connection | ErrorKind::Timeout | ErrorKind::Read | ErrorKind::ServerError => {
                true
            }
            ErrorKind::Cancelled
            | ErrorKind::CircuitOpen
            | ErrorKind::InvalidRequest
            | ErrorKind::Internal => false,
        }
    }

    /// Whether this failure says something about the endpoint's health.
    ///
    /// Exactly the retryable kinds: a failure worth retrying is one the
    /// endpoint caused, and the rest are the caller's own doing.
    pub fn counts_against_breaker(self) -> bool {
        self.is_retryable()
    }

    /// Stable name, shared by the JSON output and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Read => "read",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connection => write!(f, "connection error"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Read => write!(f, "read error"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::CircuitOpen => write!(f, "circuit open"),
            ErrorKind::InvalidRequest => write!(f, "invalid request"),
            ErrorKind::ServerError => write!(f, "server error"),
            ErrorKind::Internal => write!(f, "internal error"),
        }
    }
}

/// The outcome for one target after all of its attempts.
///
/// Produced once per URL by a dispatcher worker (or once per attempt by a
/// [`Fetcher`](crate::fetch::Fetcher), with `attempts == 1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    #[serde(rename = "url")]
    pub target: String,
    pub status_code: Option<u16>,
    #[serde(rename = "size")]
    pub byte_size: Option<u64>,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

impl FetchResult {
    /// A response was received and its body fully read.
    pub fn completed(target: impl Into<String>, status: u16, bytes: u64, elapsed: Duration) -> Self {
        Self {
            target: target.into(),
            status_code: Some(status),
            byte_size: Some(bytes),
            elapsed,
            error_kind: None,
            error: None,
            attempts: 1,
        }
    }

    pub fn failed(
        target: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            target: target.into(),
            status_code: None,
            byte_size: None,
            elapsed,
            error_kind: Some(kind),
            error: Some(message.into()),
            attempts: 1,
        }
    }

    pub fn cancelled(target: impl Into<String>, elapsed: Duration) -> Self {
        Self::failed(target, ErrorKind::Cancelled, "batch cancelled", elapsed)
    }

    /// Attach the status code of a response that was classified as a failure.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Stamp the final attempt count and total worker time.
    pub fn finish(mut self, attempts: u32, elapsed: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.elapsed = elapsed;
        self
    }

    /// No error and a status in `[200, 400)`.
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none() && matches!(self.status_code, Some(code) if (200..400).contains(&code))
    }
}

impl CallOutcome for FetchResult {
    fn verdict(&self) -> Verdict {
        match self.error_kind {
            None => Verdict::Success,
            Some(kind) if kind.counts_against_breaker() => Verdict::Failure,
            Some(_) => Verdict::Neutral,
        }
    }
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(elapsed.as_millis() as u64)
}
