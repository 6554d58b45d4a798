//! thermod - temperature registry server
//!
//! Owns the address-space registry, pre-populates it from the sensor
//! catalog, watches it for changes and accepts agent sessions over TCP.
//!
//! # Usage
//!
//! ```bash
//! # Start with the default config (written on first run)
//! thermod
//!
//! # Override the listen address, skip the startup sweep
//! thermod --listen 127.0.0.1:4841 --no-prepopulate
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use thermod::config::{default_config_path, ServerConfig};
use thermod::daemon;

/// thermod - temperature registry server
#[derive(Parser, Debug)]
#[command(name = "thermod", version, about)]
struct Args {
    /// Path to server.toml (created with defaults if missing)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    listen: Option<String>,

    /// Skip the startup catalog sweep
    #[arg(long)]
    no_prepopulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("thermod=info".parse()?)
                .add_directive("thermo_core=info".parse()?)
                .add_directive("thermo_protocol=info".parse()?),
        )
        .init();

    let config_path = args.config.unwrap_or_else(default_config_path);
    let mut config = ServerConfig::load_or_init(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if args.no_prepopulate {
        config.prepopulate.enabled = false;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        config = %config_path.display(),
        "thermod starting"
    );

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let server = daemon::start(&config, cancel_token)
        .await
        .context("Failed to start registry server")?;
    if let Some(sweep) = &server.sweep {
        info!(
            attempted = sweep.attempted,
            created = sweep.created,
            existing = sweep.existing,
            failed = sweep.failed,
            "Startup sweep complete"
        );
    }
    info!(addr = %server.local_addr, namespace = %config.namespace_uri, "Listening");

    if let Err(e) = server.wait().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("thermod stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
