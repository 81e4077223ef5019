//! Outbound admission control with a token bucket.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// The wait for a token was abandoned because the batch was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limiter wait cancelled")]
pub struct Cancelled;

/// A lazily refilled token bucket.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    fn refill(&mut self, capacity: f64, refill_rate: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;
    }

    /// Take a token, or report how long until one is available.
    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> Result<(), Duration> {
        self.refill(capacity, refill_rate, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            Err(Duration::try_from_secs_f64(missing / refill_rate).unwrap_or(Duration::MAX))
        }
    }
}

/// Batch-wide rate limiter shared by every worker.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    capacity: f64,
    refill_rate: f64,
}

impl RateLimiter {
    /// `refill_rate` tokens per second, at most `capacity` banked. The bucket
    /// starts full. Non-positive inputs are clamped to a minimal valid bucket.
    pub fn new(refill_rate: f64, capacity: u32) -> Self {
        let capacity = f64::from(capacity.max(1));
        let refill_rate = if refill_rate.is_finite() && refill_rate > 0.0 {
            refill_rate
        } else {
            f64::MIN_POSITIVE
        };
        Self {
            bucket: Mutex::new(TokenBucket::new(capacity, Instant::now())),
            capacity,
            refill_rate,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst_size)
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.poll(Instant::now()).is_ok()
    }

    /// Wait until a token is available or `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        let started = Instant::now();
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            let wait = match self.poll(Instant::now()) {
                Ok(()) => {
                    let waited = started.elapsed();
                    if !waited.is_zero() {
                        tracing::trace!(waited = ?waited, "Rate limiter admitted after wait");
                    }
                    metrics::record_rate_limit_wait(waited);
                    return Ok(());
                }
                Err(wait) => wait,
            };

            // Another worker may take the token first; loop and re-check.
            tokio::select! {
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = time::sleep(wait) => {}
            }
        }
    }

    /// Tokens currently banked, after refill.
    pub fn available(&self) -> f64 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(self.capacity, self.refill_rate, Instant::now());
        bucket.tokens
    }

    fn poll(&self, now: Instant) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.try_acquire(self.capacity, self.refill_rate, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = RateLimiter::new(2.0, 3);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        time::advance(Duration::from_millis(500)).await;
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_capacity() {
        let limiter = RateLimiter::new(100.0, 4);
        time::advance(Duration::from_secs(60)).await;
        assert_eq!(limiter.available(), 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_token() {
        let limiter = RateLimiter::new(1.0, 1);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();
        limiter.acquire(&cancel).await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(2100), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_honours_cancellation() {
        let limiter = Arc::new(RateLimiter::new(0.01, 1));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { limiter.acquire(&cancel).await })
        };
        time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admissions_bounded_by_window() {
        let rate = 5.0;
        let capacity = 3;
        let limiter = Arc::new(RateLimiter::new(rate, capacity));
        let cancel = CancellationToken::new();
        let admitted = Arc::new(Mutex::new(Vec::new()));

        let mut workers = Vec::new();
        for _ in 0..40 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            let admitted = admitted.clone();
            workers.push(tokio::spawn(async move {
                limiter.acquire(&cancel).await.unwrap();
                admitted.lock().unwrap().push(Instant::now());
            }));
        }
        for worker in workers {
            worker.await.unwrap();
        }

        let mut times = admitted.lock().unwrap().clone();
        times.sort();
        assert_eq!(times.len(), 40);

        // Any window of length T holds at most capacity + rate * T admissions.
        for (i, start) in times.iter().enumerate() {
            for window_ms in [0u64, 200, 1000, 3000] {
                let window = Duration::from_millis(window_ms);
                let inside = times[i..].iter().take_while(|t| **t - *start <= window).count();
                let bound = f64::from(capacity) + rate * window.as_secs_f64() + 1e-6;
                assert!(
                    inside as f64 <= bound,
                    "{} admissions within {:?} (bound {})",
                    inside,
                    window,
                    bound
                );
            }
        }
    }
}
