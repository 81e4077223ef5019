//! Single-attempt HTTP fetching.
//!
//! # Responsibilities
//! - Issue one GET over a shared, pooled client
//! - Stream the body to count its bytes, under a read deadline
//! - Classify every failure into an [`ErrorKind`]; nothing escapes as an error

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::TransportConfig;
use crate::fetch::result::{ErrorKind, FetchResult};

/// Performs exactly one request attempt against a target.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` once. Must return promptly with [`ErrorKind::Cancelled`]
    /// once `cancel` fires.
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> FetchResult;
}

/// [`Fetcher`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    read_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &TransportConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self::with_client(client, Duration::from_millis(config.read_timeout_ms)))
    }

    /// Wrap an existing client, e.g. one shared with other components.
    pub fn with_client(client: reqwest::Client, read_timeout: Duration) -> Self {
        Self {
            client,
            read_timeout,
        }
    }

    async fn attempt(&self, target: &str, started: Instant) -> FetchResult {
        let url = match Url::parse(target) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url,
            Ok(url) => {
                return FetchResult::failed(
                    target,
                    ErrorKind::InvalidRequest,
                    format!("unsupported scheme '{}'", url.scheme()),
                    started.elapsed(),
                )
            }
            Err(e) => {
                return FetchResult::failed(target, ErrorKind::InvalidRequest, e.to_string(), started.elapsed())
            }
        };

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return FetchResult::failed(target, classify(&e), e.to_string(), started.elapsed()),
        };

        let status = response.status();
        let body = time::timeout(self.read_timeout, count_body(response)).await;
        let elapsed = started.elapsed();

        match body {
            Err(_) => FetchResult::failed(
                target,
                ErrorKind::Timeout,
                format!("body read exceeded {:?}", self.read_timeout),
                elapsed,
            )
            .with_status(status.as_u16()),
            Ok(Err(e)) => FetchResult::failed(target, classify(&e), e.to_string(), elapsed).with_status(status.as_u16()),
            Ok(Ok(bytes)) if status.is_server_error() => {
                let mut result = FetchResult::failed(target, ErrorKind::ServerError, status.to_string(), elapsed)
                    .with_status(status.as_u16());
                result.byte_size = Some(bytes);
                result
            }
            Ok(Ok(bytes)) => FetchResult::completed(target, status.as_u16(), bytes, elapsed),
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> FetchResult {
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => FetchResult::cancelled(url, started.elapsed()),
            result = self.attempt(url, started) => result,
        };

        match result.error_kind {
            None => tracing::debug!(
                url = %url,
                status = ?result.status_code,
                bytes = ?result.byte_size,
                elapsed = ?result.elapsed,
                "Fetch completed"
            ),
            Some(kind) => tracing::debug!(
                url = %url,
                kind = %kind,
                error = result.error.as_deref().unwrap_or_default(),
                elapsed = ?result.elapsed,
                "Fetch failed"
            ),
        }
        result
    }
}

async fn count_body(response: reqwest::Response) -> Result<u64, reqwest::Error> {
    let mut total = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        total += chunk?.len() as u64;
    }
    Ok(total)
}

fn classify(e: &reqwest::Error) -> ErrorKind {
    if e.is_timeout() {
        ErrorKind::Timeout
    } else if e.is_builder() {
        ErrorKind::InvalidRequest
    } else if e.is_body() || e.is_decode() {
        ErrorKind::Read
    } else {
        ErrorKind::Connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&TransportConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_targets_are_not_sent() {
        let cancel = CancellationToken::new();

        let result = fetcher().fetch("not a url", &cancel).await;
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidRequest));
        assert_eq!(result.attempts, 1);

        let result = fetcher().fetch("ftp://example.com/file", &cancel).await;
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidRequest));
        assert!(result.error.unwrap().contains("ftp"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = fetcher().fetch("http://127.0.0.1:9/", &cancel).await;
        assert_eq!(result.error_kind, Some(ErrorKind::Cancelled));
    }
}
