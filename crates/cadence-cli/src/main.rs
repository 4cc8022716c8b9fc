//! cadence: run the scheduler with a couple of demo tasks and print status.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use cadence_core::app::{SchedulerConfig, SchedulerStatus};
use cadence_core::domain::{ActionError, Payload, Priority, TaskSpec};
use cadence_core::ports::{ActionContext, TaskAction, action_fn};
use cadence_core::Scheduler;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Run an in-process recurring task scheduler.
#[derive(Debug, Parser)]
#[command(name = "cadence", version, about)]
struct Cli {
    /// JSON config file (durations in milliseconds). Flags override it.
    #[arg(short, long, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Delay between poll cycles.
    #[arg(long, env = "CADENCE_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Upper bound on concurrent runs.
    #[arg(long, env = "CADENCE_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,

    /// Interval of the demo heartbeat task.
    #[arg(long, env = "CADENCE_HEARTBEAT_MS", default_value_t = 1_000)]
    heartbeat_ms: u64,

    /// Stop after this many seconds (otherwise wait for Ctrl-C).
    #[arg(long, env = "CADENCE_RUN_FOR_SECS")]
    run_for_secs: Option<u64>,

    /// Used when RUST_LOG is not set.
    #[arg(long, env = "CADENCE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "CADENCE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

impl Cli {
    fn scheduler_config(&self) -> anyhow::Result<SchedulerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                SchedulerConfig::from_json(&raw)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => SchedulerConfig::default(),
        };
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        if self.max_concurrency.is_some() {
            config.max_concurrency = self.max_concurrency;
        }
        Ok(config)
    }
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).init(),
    }
}

/// Fails the first `n` attempts, then greets.
struct FlakyGreeter {
    remaining_failures: AtomicU32,
}

impl FlakyGreeter {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[derive(Serialize)]
struct Greeting<'a> {
    greeting: &'a str,
    attempt: u32,
}

#[async_trait]
impl TaskAction for FlakyGreeter {
    async fn execute(&self, ctx: ActionContext) -> Result<Payload, ActionError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(ActionError::new(format!("intentional failure (left={left})")));
        }
        Payload::json(&Greeting {
            greeting: "hello",
            attempt: ctx.attempt,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let config = cli.scheduler_config()?;
    let scheduler = Scheduler::new(config).context("invalid scheduler config")?;

    let beats = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&beats);
    scheduler
        .schedule(
            TaskSpec::recurring("heartbeat", Duration::from_millis(cli.heartbeat_ms))
                .priority(Priority::Low),
            action_fn(move |_ctx| {
                let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                async move { Ok(Payload::new(format!("beat {n}"))) }
            }),
        )
        .await?;

    scheduler
        .schedule(
            TaskSpec::once("greeter")
                .priority(Priority::High)
                .max_retries(3),
            Arc::new(FlakyGreeter::new(2)),
        )
        .await?;

    scheduler.start().await?;

    match cli.run_for_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                res = tokio::signal::ctrl_c() => res.context("listening for ctrl-c")?,
            }
        }
        None => tokio::signal::ctrl_c()
            .await
            .context("listening for ctrl-c")?,
    }

    let report = scheduler.stop(None).await;
    if !report.abandoned.is_empty() {
        tracing::warn!(abandoned = report.abandoned.len(), "some runs were still in flight");
    }

    print_status(&scheduler.get_scheduler_status().await)?;
    tracing::info!(heartbeats = beats.load(Ordering::Relaxed), "bye");
    Ok(())
}

fn print_status(status: &SchedulerStatus) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(status).context("serializing status")?;
    println!("{json}");
    Ok(())
}
