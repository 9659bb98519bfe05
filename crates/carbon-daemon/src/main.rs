//! `carbon-daemon`: wires the line ingestor, `MetricCache`, `CacheDrainer`,
//! and `StorageWriter` together behind a CLI, and drives shutdown in the
//! order that keeps every acknowledged store safe on disk.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use carbon_cache::{DaemonConfig, DaemonLifecycle, DaemonMetrics, MetricCache, WriteModeConfig};
use carbon_storage::{StorageResolver, StorageWriter, WriteMode};
use clap::Parser;

/// Graphite-compatible metrics ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "carbon-daemon", version, about = "Line-oriented metrics ingestion daemon")]
struct Cli {
    /// Optional TOML config file; CLI flags and `CARBON_*` env vars override
    /// whatever it sets.
    #[arg(long, env = "CARBON_CONFIG")]
    config: Option<PathBuf>,

    /// Address and port the line ingestor listens on.
    #[arg(long, env = "CARBON_BIND")]
    bind: Option<String>,

    /// Base directory under which per-key archive files are created.
    #[arg(long = "data-dir", env = "CARBON_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to the retention-schema resolver rule file.
    #[arg(long = "schemas-config", env = "CARBON_SCHEMAS_CONFIG")]
    schemas_config: Option<PathBuf>,

    /// Path to the aggregation-method resolver rule file.
    #[arg(long = "aggregation-config", env = "CARBON_AGGREGATION_CONFIG")]
    aggregation_config: Option<PathBuf>,

    /// Maximum number of simultaneously open archive file handles.
    #[arg(long = "handle-pool-capacity", env = "CARBON_HANDLE_POOL_CAPACITY")]
    handle_pool_capacity: Option<usize>,

    /// Whether `StorageWriter::send` waits for the write to reach disk.
    #[arg(long = "write-mode", env = "CARBON_WRITE_MODE")]
    write_mode: Option<WriteModeArg>,

    /// `tracing` filter directive, e.g. `info` or `carbon_storage=debug`.
    #[arg(long = "log-level", env = "CARBON_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum WriteModeArg {
    Sync,
    Async,
}

impl From<WriteModeArg> for WriteModeConfig {
    fn from(value: WriteModeArg) -> Self {
        match value {
            WriteModeArg::Sync => Self::Sync,
            WriteModeArg::Async => Self::Async,
        }
    }
}

fn load_config(cli: &Cli) -> Result<DaemonConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            DaemonConfig::from_toml_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => DaemonConfig::default(),
    };

    if let Some(bind) = &cli.bind {
        config.bind = bind.clone();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    if let Some(schemas_config) = &cli.schemas_config {
        config.schemas_config = schemas_config.clone();
    }
    if let Some(aggregation_config) = &cli.aggregation_config {
        config.aggregation_config = aggregation_config.clone();
    }
    if let Some(capacity) = cli.handle_pool_capacity {
        config.handle_pool_capacity = capacity;
    }
    if let Some(write_mode) = cli.write_mode {
        config.write_mode = write_mode.into();
    }
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone();
    }

    Ok(config)
}

fn init_logging(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .init();
}

fn exit_with(code: i32, err: anyhow::Error) -> ! {
    eprintln!("carbon-daemon: {err:#}");
    std::process::exit(code);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => exit_with(1, e),
    };

    init_logging(&config.log_level);

    if let Err(e) = run(config).await {
        exit_with(2, e);
    }
}

async fn run(config: DaemonConfig) -> Result<()> {
    let bind_addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {:?}", config.bind))?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data directory {}", config.data_dir.display()))?;

    let schemas_text = std::fs::read_to_string(&config.schemas_config)
        .with_context(|| format!("reading {}", config.schemas_config.display()))?;
    let aggregation_text = std::fs::read_to_string(&config.aggregation_config)
        .with_context(|| format!("reading {}", config.aggregation_config.display()))?;
    let resolver = Arc::new(
        StorageResolver::from_strs(&schemas_text, &aggregation_text)
            .context("loading storage resolver rules")?,
    );

    let handle_pool_capacity = NonZeroUsize::new(config.handle_pool_capacity)
        .context("handle-pool-capacity must be greater than zero")?;
    let write_mode: WriteMode = config.write_mode.into();

    let lifecycle = DaemonLifecycle::new();
    let metrics = Arc::new(DaemonMetrics::new());

    let (cache, cache_task) = MetricCache::spawn(carbon_core::DEFAULT_COMMAND_QUEUE_CAPACITY);
    let (writer, writer_task) = StorageWriter::spawn_with_metrics(
        config.data_dir.clone(),
        Arc::clone(&resolver),
        handle_pool_capacity,
        write_mode,
        Arc::clone(&metrics),
    );
    let drainer_task = carbon_cache::drainer::spawn(
        cache.clone(),
        writer.clone(),
        lifecycle.shutdown_signal(),
    );

    let ingest_shutdown = lifecycle.shutdown_signal();
    let ingest_cache = cache.clone();
    let ingest_metrics = Arc::clone(&metrics);
    let ingest_task = tokio::spawn(async move {
        carbon_ingest::run(bind_addr, ingest_cache, ingest_metrics, ingest_shutdown).await
    });

    lifecycle.start().await;
    tracing::info!(bind = %bind_addr, data_dir = %config.data_dir.display(), "carbon-daemon running");

    let mut report_interval =
        tokio::time::interval(std::time::Duration::from_secs(config.metrics_report_interval_secs.max(1)));
    report_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("installing SIGTERM handler")?;

    loop {
        #[cfg(unix)]
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            _ = report_interval.tick() => {
                carbon_cache::report_metrics(&metrics);
            }
        }
        #[cfg(not(unix))]
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
            _ = report_interval.tick() => {
                carbon_cache::report_metrics(&metrics);
            }
        }
    }

    // Stop in dependency order: ingestor, then drainer, then writer, then
    // cache. Each step's task must actually finish before the next
    // component closes, or a late `send` could race a closed inbox.
    lifecycle.shutdown().await;

    match ingest_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "line ingestor stopped with an error"),
        Err(e) => tracing::warn!(error = %e, "line ingestor task panicked"),
    }

    if let Err(e) = drainer_task.await {
        tracing::warn!(error = %e, "drainer task panicked");
    }

    if let Err(e) = writer.close().await {
        tracing::warn!(error = %e, "storage writer close reported an error");
    }
    if let Err(e) = writer_task.await {
        tracing::warn!(error = %e, "storage writer task panicked");
    }

    match cache.close().await {
        Ok(residual) if !residual.is_empty() => {
            let dropped: usize = residual.values().map(Vec::len).sum();
            tracing::warn!(
                keys = residual.len(),
                points = dropped,
                "dropped residual cache data on shutdown"
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "cache close reported an error"),
    }
    if let Err(e) = cache_task.await {
        tracing::warn!(error = %e, "cache task panicked");
    }

    tracing::info!("carbon-daemon stopped cleanly");
    Ok(())
}
