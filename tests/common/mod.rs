//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use resilient_fetch::config::EngineConfig;
use resilient_fetch::{ErrorKind, FetchResult, Fetcher};

/// What a scripted target does on one attempt.
#[derive(Debug, Clone)]
pub enum Step {
    /// Answer immediately with this status and a 10 byte body.
    Respond(u16),
    /// Answer with this status after a delay.
    After(Duration, u16),
    /// Fail with this kind.
    Fail(ErrorKind),
    /// Never answer; only cancellation ends the attempt.
    Hang,
    /// Panic inside the transport.
    Panic,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub at: Instant,
}

/// In-memory [`Fetcher`] that plays back a per-target script. The last step
/// of a script repeats forever; unscripted targets get the fallback.
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    fallback: Step,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(fallback: Step) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn script(self, url: &str, steps: Vec<Step>) -> Self {
        self.scripts.lock().unwrap().insert(url.to_string(), steps.into());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> Vec<Instant> {
        self.calls().into_iter().filter(|c| c.url == url).map(|c| c.at).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, url: &str) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(steps) if steps.len() > 1 => steps.pop_front().unwrap(),
            Some(steps) => steps.front().cloned().unwrap_or_else(|| self.fallback.clone()),
            None => self.fallback.clone(),
        }
    }

    async fn play(url: &str, step: Step, started: Instant) -> FetchResult {
        match step {
            Step::Respond(status) => FetchResult::completed(url, status, 10, started.elapsed()),
            Step::After(delay, status) => {
                time::sleep(delay).await;
                FetchResult::completed(url, status, 10, started.elapsed())
            }
            Step::Fail(kind) => FetchResult::failed(url, kind, "scripted failure", started.elapsed()),
            Step::Hang => std::future::pending().await,
            Step::Panic => panic!("transport panicked for {url}"),
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> FetchResult {
        let started = Instant::now();
        self.calls.lock().unwrap().push(Call {
            url: url.to_string(),
            at: started,
        });
        let step = self.next_step(url);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => FetchResult::cancelled(url, started.elapsed()),
            result = Self::play(url, step, started) => result,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// A config with limits loose enough that only the knobs a test sets matter.
pub fn loose_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.rate_limit.requests_per_second = 10_000.0;
    config.rate_limit.burst_size = 10_000;
    config.retries.max_retries = 0;
    config.circuit_breaker.failure_threshold = 100;
    config.dispatch.batch_timeout_secs = 3600;
    config
}

pub fn result_for<'a>(results: &'a [FetchResult], url: &str) -> &'a FetchResult {
    results
        .iter()
        .find(|r| r.target == url)
        .unwrap_or_else(|| panic!("no result for {url}"))
}

/// Start a programmable mock backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a backend that sends headers and part of the body, then stalls.
pub async fn start_stalling_backend(stall: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let head = "HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\npartial";
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.flush().await;
                tokio::time::sleep(stall).await;
            });
        }
    });

    addr
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}
