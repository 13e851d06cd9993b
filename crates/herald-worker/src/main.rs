//! `herald` — notification delivery worker.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the
//! SQLite store, runs startup recovery, then drives the delivery poller
//! and the stale-claim sweep until interrupted.

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use herald_core::{occurrence::StrategyRegistry, schedule::Scheduler};
use herald_delivery::{
  CircuitBreaker, DeliveryPipeline, HttpTransport, RetryPolicy,
};
use herald_store_sqlite::SqliteStore;
use herald_worker::{Recovery, Worker, WorkerConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Herald notification worker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("HERALD"))
    .build()
    .context("failed to read config file")?;

  let cfg: WorkerConfig = settings
    .try_deserialize()
    .context("failed to deserialise WorkerConfig")?;

  // Open SQLite store.
  let store = Arc::new(
    SqliteStore::open(&cfg.store_path)
      .await
      .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?,
  );

  let registry = Arc::new(StrategyRegistry::standard());
  let scheduler = Arc::new(Scheduler::new(store.clone(), registry));

  let transport = HttpTransport::new(&cfg.endpoint_url)
    .context("invalid delivery endpoint")?;
  let pipeline = DeliveryPipeline::new(
    transport,
    RetryPolicy::default(),
    CircuitBreaker::default(),
  );

  let worker =
    Worker::new(store.clone(), scheduler.clone(), pipeline, cfg.batch_size);
  let recovery =
    Recovery::new(store.clone(), scheduler.clone(), cfg.stale_after());

  recovery.startup().await.context("startup recovery failed")?;

  tracing::info!(
    endpoint = %cfg.endpoint_url,
    poll_secs = cfg.poll_interval_secs,
    "herald worker running"
  );

  let mut poll = tokio::time::interval(cfg.poll_interval());
  let mut sweep = tokio::time::interval(cfg.sweep_interval());

  loop {
    tokio::select! {
      _ = poll.tick() => {
        if let Err(error) = worker.tick().await {
          tracing::error!(%error, "delivery poll failed");
        }
      }
      _ = sweep.tick() => {
        if let Err(error) = recovery.sweep().await {
          tracing::error!(%error, "stale sweep failed");
        }
      }
      _ = tokio::signal::ctrl_c() => {
        tracing::info!("shutdown requested");
        break;
      }
    }
  }

  Ok(())
}
