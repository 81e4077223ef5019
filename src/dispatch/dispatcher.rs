//! Batch fan-out and fan-in.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{self, JoinSet};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::EngineConfig;
use crate::dispatch::worker::{self, Batch};
use crate::fetch::{ErrorKind, FetchResult, Fetcher, HttpFetcher};
use crate::observability::metrics;

/// Fans a list of targets out to concurrent workers and collects one
/// [`FetchResult`] per target.
///
/// The dispatcher itself only holds configuration and the transport. Rate
/// limiter, breakers and concurrency permits are created per batch.
#[derive(Clone)]
pub struct Dispatcher {
    config: EngineConfig,
    fetcher: Arc<dyn Fetcher>,
}

impl Dispatcher {
    /// Build a dispatcher with the pooled HTTP transport described by
    /// `config.transport`.
    pub fn new(config: EngineConfig) -> Result<Self, reqwest::Error> {
        let fetcher = HttpFetcher::new(&config.transport)?;
        Ok(Self::with_fetcher(config, Arc::new(fetcher)))
    }

    /// Build a dispatcher around any transport.
    pub fn with_fetcher(config: EngineConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { config, fetcher }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fetch every target and return the results in completion order.
    ///
    /// Returns once every worker has finished. Targets still pending when
    /// `cancel` fires or the batch timeout elapses end as cancelled.
    pub async fn dispatch_all<I>(&self, targets: I, cancel: &CancellationToken) -> Vec<FetchResult>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.dispatch(targets, cancel, tx).await;

        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }

    /// Like [`dispatch_all`](Self::dispatch_all), but streams each result
    /// into `sink` as soon as its worker finishes.
    pub async fn dispatch<I>(&self, targets: I, cancel: &CancellationToken, sink: mpsc::UnboundedSender<FetchResult>)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let batch_cancel = cancel.child_token();
        let batch = Arc::new(Batch::new(&self.config, self.fetcher.clone(), batch_cancel.clone()));

        let started = Instant::now();
        let mut workers = JoinSet::new();
        let mut pending: HashMap<task::Id, String> = HashMap::new();
        for target in targets {
            let target: String = target.into();
            let span = tracing::info_span!("fetch", url = %target);
            let handle = workers.spawn(worker::run(batch.clone(), target.clone()).instrument(span));
            pending.insert(handle.id(), target);
        }

        let timeout = self.config.dispatch.batch_timeout();
        tracing::info!(
            targets = workers.len(),
            max_concurrency = ?self.config.dispatch.max_concurrency,
            timeout = ?timeout,
            "Dispatching batch"
        );

        let deadline = time::sleep(timeout);
        tokio::pin!(deadline);
        let mut timed_out = false;

        loop {
            tokio::select! {
                joined = workers.join_next_with_id() => {
                    let result = match joined {
                        None => break,
                        Some(Ok((id, result))) => {
                            pending.remove(&id);
                            result
                        }
                        Some(Err(e)) => {
                            let target = pending.remove(&e.id()).unwrap_or_default();
                            tracing::error!(url = %target, error = %e, "Worker task failed");
                            FetchResult::failed(target, ErrorKind::Internal, e.to_string(), started.elapsed())
                        }
                    };
                    metrics::record_result(&result);
                    // A dropped receiver only means nobody is listening anymore.
                    let _ = sink.send(result);
                }
                _ = &mut deadline, if !timed_out => {
                    timed_out = true;
                    tracing::warn!(timeout = ?timeout, remaining = workers.len(), "Batch timed out, cancelling pending targets");
                    batch_cancel.cancel();
                }
            }
        }

        tracing::info!(timed_out, cancelled = batch_cancel.is_cancelled(), "Batch complete");
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
