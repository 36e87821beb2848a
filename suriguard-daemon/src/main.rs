//! suriguard-daemon entry point.
//!
//! Bootstraps the detection pipeline: loads configuration, initializes
//! tracing and the metrics exporter, loads the scoring model (fatal on
//! failure -- the process never starts half-initialized), starts the
//! pipeline, and waits for SIGTERM/SIGINT to shut down gracefully.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use suriguard_core::config::SuriguardConfig;
use suriguard_core::metrics as m;
use suriguard_core::pipeline::Pipeline;
use suriguard_detect::config::DetectConfig;
use suriguard_detect::pipeline::DetectPipelineBuilder;
use suriguard_detect::scorer::IsolationForestScorer;

mod cli;
mod logging;
mod metrics_server;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::DaemonCli::parse();

    let mut config = SuriguardConfig::load(&args.config).await.map_err(|e| {
        anyhow::anyhow!(
            "failed to load config from {}: {}",
            args.config.display(),
            e
        )
    })?;

    // CLI overrides take precedence over config file and env vars
    if let Some(level) = &args.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &args.log_format {
        config.general.log_format = format.clone();
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if args.validate {
        println!("configuration OK: {}", args.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "suriguard-daemon starting");

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
        metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    }

    // Model load and schema mismatch are fatal at startup: scoring with
    // the wrong column order must never happen silently.
    let detect_config = DetectConfig::from_core(&config.detect);
    let scorer = IsolationForestScorer::load(
        &detect_config.model_path,
        detect_config.feature_columns_path.as_deref(),
    )
    .await
    .map_err(|e| anyhow::anyhow!("failed to load scoring model: {}", e))?;

    let mut pipeline = DetectPipelineBuilder::new()
        .config(detect_config)
        .scorer(Arc::new(scorer))
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build detection pipeline: {}", e))?;

    pipeline
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start detection pipeline: {}", e))?;

    let start_time = Instant::now();
    let uptime_task = config
        .metrics
        .enabled
        .then(|| spawn_uptime_updater(start_time));

    tracing::info!("suriguard-daemon running -- detection pipeline active");
    let signal = wait_for_shutdown_signal().await?;
    tracing::info!(signal, "shutdown signal received");

    if let Some(task) = uptime_task {
        task.abort();
    }

    // Graceful stop: lets the in-flight tail cycle finish and the final
    // flush attempt complete before file handles are released.
    if let Err(e) = pipeline.stop().await {
        tracing::error!(error = %e, "failed to stop detection pipeline");
    }

    tracing::info!(
        uptime_secs = start_time.elapsed().as_secs(),
        lines = pipeline.lines_collected(),
        flows = pipeline.processed_count(),
        anomalies = pipeline.anomaly_count(),
        parse_errors = pipeline.parse_error_count(),
        "suriguard-daemon shut down"
    );
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Spawn a background task that periodically updates the uptime metric.
///
/// Updates every 10 seconds to keep the metric fresh for Prometheus scrapes.
fn spawn_uptime_updater(start_time: Instant) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(start_time.elapsed().as_secs() as f64);
        }
    })
}
