//! shardd — the shardgrid daemon.
//!
//! Single binary that assembles the partition configuration managers:
//! - Storage cluster manager
//! - Tenant → storage cluster mapper
//! - Data partition manager
//! - API-server config manager and the REST client pool it drives
//! - Status API (`/healthz`, `/debug/partitions`)
//!
//! # Usage
//!
//! ```text
//! shardd --config /etc/shardgrid/shardd.toml
//! ```

mod daemon;
mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use shard_core::ShardConfig;
use shardgrid_client::{ClientFactory, ClientPool, HttpRestClient, PoolSettings};
use shardgrid_partition::exit_process;
use tokio::sync::watch;
use tracing::info;

const DEFAULT_LOG_FILTER: &str = "info,shardd=debug,shardgrid=debug";

#[derive(Parser)]
#[command(name = "shardd", about = "Shardgrid daemon", version)]
struct Cli {
    /// Path to shardd.toml. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    run(config).await
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ShardConfig> {
    match path {
        Some(path) => ShardConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => {
            info!("no config file given, using defaults");
            Ok(ShardConfig::default())
        }
    }
}

async fn run(config: ShardConfig) -> anyhow::Result<()> {
    info!(
        service_group = %config.partition.service_group_id,
        bootstrap = %config.api_server.bootstrap_url,
        "shardd starting"
    );

    // ── Client pool ────────────────────────────────────────────

    let timeout = Duration::from_secs(config.api_server.request_timeout_secs);
    let factory: ClientFactory<HttpRestClient> =
        Arc::new(move |url: &str| HttpRestClient::new(url, timeout));
    let bootstrap = HttpRestClient::new(&config.api_server.bootstrap_url, timeout)
        .context("invalid api_server.bootstrap_url")?;
    let pool = Arc::new(ClientPool::new(PoolSettings::from(&config.client), factory, bootstrap));

    // ── Managers and informers ─────────────────────────────────

    let daemon = daemon::Daemon::build(config.clone(), pool, exit_process())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = daemon.start(shutdown_rx.clone());

    // ── Status API ─────────────────────────────────────────────

    let listener = tokio::net::TcpListener::bind(&config.status.listen)
        .await
        .with_context(|| format!("failed to bind status listener on {}", config.status.listen))?;
    info!(addr = %config.status.listen, "status API listening");

    axum::serve(listener, status::router(daemon.status_state()))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    for handle in handles {
        let _ = handle.await;
    }
    info!("shardd stopped");
    Ok(())
}
