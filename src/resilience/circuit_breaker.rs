//! Circuit breaker for endpoint protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: endpoint assumed down, calls fail fast
//! - Half-Open: a single trial call tests whether the endpoint recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: open_duration elapsed since the last failure
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (cool-down restarts)
//! ```
//!
//! # Design Decisions
//! - Fail fast in Open state (the operation is never invoked)
//! - Single trial in Half-Open; concurrent callers see it as still Open
//! - Cancelled or abandoned calls are neutral: they neither trip nor reset
//! - Every success or failure counts, even one admitted before the last
//!   transition; only the trial slot is tied to its own Half-Open window

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// How a guarded call's outcome affects the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    Failure,
    /// Says nothing about endpoint health (e.g. the caller cancelled).
    Neutral,
}

/// Classifies the value returned by a guarded operation.
pub trait CallOutcome {
    fn verdict(&self) -> Verdict;
}

impl<T, E> CallOutcome for Result<T, E> {
    fn verdict(&self) -> Verdict {
        match self {
            Ok(_) => Verdict::Success,
            Err(_) => Verdict::Failure,
        }
    }
}

/// Returned instead of running the operation while the breaker is open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit open for {endpoint}, next trial in {retry_in:?}")]
pub struct CircuitOpen {
    pub endpoint: String,
    /// Time until a trial call may be admitted. Zero while a trial is running.
    pub retry_in: Duration,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
    /// Bumped on every transition so a trial from an earlier Half-Open
    /// window cannot release the current trial slot.
    generation: u64,
}

#[derive(Debug, Clone, Copy)]
struct Admission {
    generation: u64,
    trial: bool,
}

/// A failure-isolation state machine shared by every worker that targets the
/// same endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    failure_threshold: u32,
    open_duration: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a closed breaker. A threshold of zero is treated as one.
    pub fn new(endpoint: impl Into<String>, failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            failure_threshold: failure_threshold.max(1),
            open_duration,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure_at: None,
                trial_in_flight: false,
                generation: 0,
            }),
        }
    }

    pub fn from_config(endpoint: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(endpoint, config.failure_threshold, config.open_duration())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run `operation` under the breaker's protection.
    ///
    /// The operation is invoked at most once. If the returned future is
    /// dropped before completing, the admission is released as neutral.
    pub async fn guard<F, Fut, T>(&self, operation: F) -> Result<T, CircuitOpen>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
        T: CallOutcome,
    {
        let permit = self.try_call()?;
        let outcome = operation().await;
        permit.complete(outcome.verdict());
        Ok(outcome)
    }

    /// Ask for admission without running anything yet.
    pub fn try_call(&self) -> Result<CallPermit<'_>, CircuitOpen> {
        let admission = self.admit_at(Instant::now())?;
        Ok(CallPermit {
            breaker: self,
            admission,
            done: false,
        })
    }

    /// Current state as seen by a caller arriving now.
    pub fn state(&self) -> CircuitState {
        self.state_at(Instant::now())
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    fn state_at(&self, now: Instant) -> CircuitState {
        let inner = self.lock();
        match inner.state {
            CircuitState::Open if self.cooled_down(&inner, now) => CircuitState::HalfOpen,
            state => state,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cooled_down(&self, inner: &Inner, now: Instant) -> bool {
        match inner.last_failure_at {
            Some(at) => now.saturating_duration_since(at) >= self.open_duration,
            None => true,
        }
    }

    fn admit_at(&self, now: Instant) -> Result<Admission, CircuitOpen> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission {
                generation: inner.generation,
                trial: false,
            }),
            CircuitState::Open => {
                if self.cooled_down(&inner, now) {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.trial_in_flight = true;
                    Ok(Admission {
                        generation: inner.generation,
                        trial: true,
                    })
                } else {
                    let since = inner
                        .last_failure_at
                        .map(|at| now.saturating_duration_since(at))
                        .unwrap_or_default();
                    Err(self.rejection(self.open_duration.saturating_sub(since)))
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.rejection(Duration::ZERO))
                } else {
                    inner.trial_in_flight = true;
                    Ok(Admission {
                        generation: inner.generation,
                        trial: true,
                    })
                }
            }
        }
    }

    fn record_at(&self, admission: Admission, verdict: Verdict, now: Instant) {
        let mut inner = self.lock();
        // Only the trial of the current Half-Open window owns the slot.
        if admission.trial && admission.generation == inner.generation {
            inner.trial_in_flight = false;
        }

        match verdict {
            Verdict::Success => {
                inner.failure_count = 0;
                inner.last_failure_at = None;
                if inner.state != CircuitState::Closed {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            Verdict::Failure => {
                inner.failure_count = inner.failure_count.saturating_add(1);
                inner.last_failure_at = Some(now);
                match inner.state {
                    CircuitState::Closed if inner.failure_count >= self.failure_threshold => {
                        self.transition(&mut inner, CircuitState::Open);
                    }
                    CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
                    // A late failure while Open restarts the cool-down.
                    CircuitState::Closed | CircuitState::Open => {}
                }
            }
            Verdict::Neutral => {}
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.generation += 1;
        inner.trial_in_flight = false;
        match to {
            CircuitState::Open => tracing::warn!(
                endpoint = %self.endpoint,
                from = from.as_str(),
                failures = inner.failure_count,
                "Circuit breaker opened"
            ),
            _ => tracing::info!(
                endpoint = %self.endpoint,
                from = from.as_str(),
                to = to.as_str(),
                "Circuit breaker state change"
            ),
        }
        metrics::record_breaker_transition(to);
    }

    fn rejection(&self, retry_in: Duration) -> CircuitOpen {
        metrics::record_breaker_rejection();
        CircuitOpen {
            endpoint: self.endpoint.clone(),
            retry_in,
        }
    }
}

/// An admitted call. Report its outcome with [`CallPermit::complete`];
/// dropping it unreported counts as [`Verdict::Neutral`].
#[derive(Debug)]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    done: bool,
}

impl CallPermit<'_> {
    /// True when this call is the Half-Open trial.
    pub fn is_trial(&self) -> bool {
        self.admission.trial
    }

    pub fn complete(mut self, verdict: Verdict) {
        self.done = true;
        self.breaker.record_at(self.admission, verdict, Instant::now());
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.breaker
                .record_at(self.admission, Verdict::Neutral, Instant::now());
        }
    }
}
