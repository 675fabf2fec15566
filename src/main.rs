//! Endpoint Availability Monitor Binary

use availability_monitor::dashboard::ViewOutput;
use availability_monitor::sink::StdoutSink;
use availability_monitor::{AvailabilityMonitor, Config, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(version, about = "Probe endpoints and alert on availability")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, env = "MONITOR_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Override the availability threshold (0-1)
    #[arg(long)]
    threshold: Option<f64>,

    /// Print dashboard views as tables on stdout instead of log events
    #[arg(long)]
    table: bool,

    /// Print alerts on stdout instead of logging them
    #[arg(long)]
    stdout_alerts: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    initialize_tracing();

    let cli = Cli::parse();
    info!("Starting availability monitor v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load {}: {}", cli.config.display(), e);
            std::process::exit(1);
        }
    };
    config.apply_env();
    if let Some(threshold) = cli.threshold {
        config.alerting.availability_threshold = threshold;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    info!(
        "Monitor configuration - Endpoints: {}, Availability interval: {}s, Threshold: {:.2}, Check interval: {}s",
        config.websites.len(),
        config.alerting.availability_interval_secs,
        config.alerting.availability_threshold,
        config.alerting.check_interval_secs
    );

    let mut monitor = AvailabilityMonitor::new(config)?;
    if cli.table {
        monitor = monitor.with_view_output(ViewOutput::Table);
    }
    if cli.stdout_alerts {
        monitor = monitor.with_sink(Arc::new(StdoutSink));
    }

    let report = monitor.start().await?;
    if !report.halted_evaluators.is_empty() || !report.failed_probes.is_empty() {
        error!(
            "Monitor stopped with {} halted evaluators and {} failed endpoints",
            report.halted_evaluators.len(),
            report.failed_probes.len()
        );
        std::process::exit(2);
    }

    Ok(())
}

/// Initialize structured logging
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
