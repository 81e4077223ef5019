//! The per-target worker: admission, guarded attempts, backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::fetch::{ErrorKind, FetchResult, Fetcher};
use crate::observability::metrics;
use crate::resilience::{BreakerRegistry, RateLimiter, RetryPolicy};

/// State shared by every worker of one batch. Created when the batch starts
/// and dropped when it ends, so nothing carries over between batches.
pub(crate) struct Batch {
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) limiter: RateLimiter,
    pub(crate) breakers: BreakerRegistry,
    pub(crate) retry: RetryPolicy,
    pub(crate) permits: Option<Semaphore>,
    pub(crate) cancel: CancellationToken,
}

impl Batch {
    pub(crate) fn new(config: &EngineConfig, fetcher: Arc<dyn Fetcher>, cancel: CancellationToken) -> Self {
        Self {
            fetcher,
            limiter: RateLimiter::from_config(&config.rate_limit),
            breakers: BreakerRegistry::new(config.circuit_breaker.clone()),
            retry: RetryPolicy::from_config(&config.retries),
            permits: config.dispatch.max_concurrency.map(|n| Semaphore::new(n.max(1))),
            cancel,
        }
    }
}

/// Drive one target to a terminal result. Never panics on request failure;
/// every outcome, cancellation included, becomes a [`FetchResult`].
pub(crate) async fn run(batch: Arc<Batch>, target: String) -> FetchResult {
    let started = Instant::now();
    let cancel = &batch.cancel;

    let _permit = match &batch.permits {
        Some(permits) => tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(&target, 1, started),
            permit = permits.acquire() => match permit {
                Ok(permit) => Some(permit),
                Err(_) => return cancelled(&target, 1, started),
            },
        },
        None => None,
    };

    if batch.limiter.acquire(cancel).await.is_err() {
        tracing::debug!("Cancelled while waiting for a rate limit token");
        return cancelled(&target, 1, started);
    }

    let breaker = batch.breakers.breaker_for(&target);
    let mut retries = 0u32;
    loop {
        let attempts = retries + 1;
        let outcome = match breaker.guard(|| batch.fetcher.fetch(&target, cancel)).await {
            Ok(result) => result,
            Err(open) => {
                tracing::debug!(endpoint = %open.endpoint, retry_in = ?open.retry_in, "Rejected by open circuit");
                FetchResult::failed(&target, ErrorKind::CircuitOpen, open.to_string(), Duration::ZERO)
            }
        };
        metrics::record_attempt(&outcome);

        let kind = match outcome.error_kind {
            None => return outcome.finish(attempts, started.elapsed()),
            Some(kind) => kind,
        };
        if !batch.retry.should_retry(retries, kind) {
            if batch.retry.exhausted(retries) {
                tracing::warn!(attempts, kind = %kind, "Giving up after retries");
            }
            return outcome.finish(attempts, started.elapsed());
        }

        retries += 1;
        let delay = batch.retry.delay_for(retries);
        tracing::info!(attempt = attempts, kind = %kind, delay = ?delay, "Retrying after failure");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(&target, attempts, started),
            _ = time::sleep(delay) => {}
        }
    }
}

fn cancelled(target: &str, attempts: u32, started: Instant) -> FetchResult {
    FetchResult::cancelled(target, Duration::ZERO).finish(attempts, started.elapsed())
}
