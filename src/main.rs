use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use groundgate::{Config, GatewaySupervisor, OfflinePlatform, PlanWatcher};

#[derive(Parser, Debug)]
#[command(
    name = "groundgate",
    version,
    about = "Bridge ground equipment data channels to the operations platform"
)]
struct Args {
    /// Configuration file (.yaml, .yml or .json)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Schedule file with the plans to run (.yaml, .yml or .json)
    #[arg(long)]
    schedule: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let config = Config::load(&args.config)
        .with_context(|| format!("Error loading config file {}", args.config.display()))?;

    let platform = match &args.schedule {
        Some(path) => OfflinePlatform::from_schedule_file(path)
            .with_context(|| format!("Error loading schedule file {}", path.display()))?,
        None => {
            warn!("No schedule file given, no passes will run");
            OfflinePlatform::default()
        }
    };
    let platform = Arc::new(platform);

    info!(
        ground_station = %config.ground_station.name,
        id = %config.ground_station.id,
        "Starting gateway"
    );

    let gateway = Arc::new(
        GatewaySupervisor::start(&config.data, platform.clone())
            .await
            .context("No data channel could be started")?,
    );
    let watcher = PlanWatcher::start(
        platform,
        gateway.clone(),
        config.ground_station.plan_update_interval(),
        &gateway.shutdown_token(),
    );

    shutdown_signal().await?;
    info!("Shutdown requested");

    watcher.stop();
    gateway.stop();
    watcher.wait().await;
    gateway.wait().await;

    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate =
        signal(SignalKind::terminate()).context("Couldn't install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Couldn't listen for SIGINT"),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await.context("Couldn't listen for Ctrl-C")
}
