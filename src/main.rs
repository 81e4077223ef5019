//! resilient-fetch (v1)
//!
//! Fetches a list of URLs concurrently under a shared rate limit, with
//! per-endpoint circuit breakers and bounded retries.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌────────────────────────────────────────────────────┐
//!                      │                   DISPATCHER                       │
//!     URL list         │  ┌──────────┐   ┌──────────┐   ┌──────────────┐    │
//!     ─────────────────┼─▶│ JoinSet  │──▶│ worker   │──▶│ rate limiter │    │
//!                      │  │ + permits│   │ per URL  │   │ (per batch)  │    │
//!                      │  └──────────┘   └──────────┘   └──────┬───────┘    │
//!                      │                                       ▼            │
//!                      │                               ┌──────────────┐     │
//!                      │                               │   breaker    │     │
//!                      │                               │ per endpoint │     │
//!                      │                               └──────┬───────┘     │
//!                      │                                       ▼            │
//!     Results          │  ┌──────────┐   ┌──────────┐   ┌──────────────┐    │
//!     ◀────────────────┼──│ report   │◀──│  retry   │◀──│ HTTP fetcher │◀───┼── Endpoints
//!                      │  │text/json │   │ backoff  │   │ (reqwest)    │    │
//!                      │  └──────────┘   └──────────┘   └──────────────┘    │
//!                      └────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio::time::Instant;

use resilient_fetch::config::{self, BreakerScope, EngineConfig, LogFormat};
use resilient_fetch::lifecycle::{signals, Shutdown};
use resilient_fetch::observability::{logging, metrics};
use resilient_fetch::report::{self, Summary};
use resilient_fetch::Dispatcher;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "resilient-fetch")]
#[command(about = "Fetch many URLs concurrently with rate limiting, retries and circuit breakers", long_about = None)]
struct Cli {
    /// URLs to fetch
    #[arg(required = true)]
    urls: Vec<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Requests per second across the whole batch
    #[arg(long)]
    rps: Option<f64>,

    /// Token bucket capacity
    #[arg(long)]
    burst: Option<u32>,

    /// Maximum number of requests in flight
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Retries after the first attempt
    #[arg(long)]
    max_retries: Option<u32>,

    /// Backoff base delay in milliseconds
    #[arg(long)]
    base_delay_ms: Option<u64>,

    /// Consecutive failures that open an endpoint's circuit
    #[arg(long)]
    failure_threshold: Option<u32>,

    /// How long an open circuit rejects calls, in milliseconds
    #[arg(long)]
    open_duration_ms: Option<u64>,

    /// What a circuit breaker guards
    #[arg(long, value_enum)]
    breaker_scope: Option<BreakerScope>,

    /// Whole-batch deadline in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, config: &mut EngineConfig) {
        if let Some(rps) = self.rps {
            config.rate_limit.requests_per_second = rps;
        }
        if let Some(burst) = self.burst {
            config.rate_limit.burst_size = burst;
        }
        if self.max_concurrency.is_some() {
            config.dispatch.max_concurrency = self.max_concurrency;
        }
        if let Some(max_retries) = self.max_retries {
            config.retries.max_retries = max_retries;
        }
        if let Some(base_delay_ms) = self.base_delay_ms {
            config.retries.base_delay_ms = base_delay_ms;
        }
        if let Some(threshold) = self.failure_threshold {
            config.circuit_breaker.failure_threshold = threshold;
        }
        if let Some(open_duration_ms) = self.open_duration_ms {
            config.circuit_breaker.open_duration_ms = open_duration_ms;
        }
        if let Some(scope) = self.breaker_scope {
            config.circuit_breaker.scope = scope;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.dispatch.batch_timeout_secs = timeout_secs;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if self.json_logs {
            config.observability.log_format = LogFormat::Json;
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => EngineConfig::default(),
    };
    cli.apply(&mut config);
    config::validate_config(&config).map_err(config::ConfigError::Validation)?;

    logging::init_logging(&config.observability);
    tracing::info!("resilient-fetch v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        urls = cli.urls.len(),
        rps = config.rate_limit.requests_per_second,
        burst = config.rate_limit.burst_size,
        max_retries = config.retries.max_retries,
        failure_threshold = config.circuit_breaker.failure_threshold,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        // Validation has already checked the address.
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        }
    }

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_ctrl_c(shutdown.clone()));

    let dispatcher = Dispatcher::new(config)?;
    let cancel = shutdown.child_token();
    let started = Instant::now();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let format = cli.format;
    let collect = async {
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            if let OutputFormat::Text = format {
                println!("{}", report::result_line(&result));
            }
            results.push(result);
        }
        results
    };
    let ((), results) = tokio::join!(dispatcher.dispatch(cli.urls.iter().cloned(), &cancel, tx), collect);

    let summary = Summary::from_results(&results, started.elapsed());
    match format {
        OutputFormat::Text => println!("{}", report::summary_line(&summary)),
        OutputFormat::Json => println!("{}", report::json_report(&results, &summary)?),
    }

    shutdown.trigger();
    tracing::info!(
        succeeded = summary.success_count,
        failed = summary.failure_count,
        "Batch finished"
    );

    Ok(if summary.all_succeeded() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
