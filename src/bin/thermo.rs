//! thermo - temperature telemetry agent
//!
//! Reads this machine's temperature sensors and pushes them to the
//! registry server every `update_interval_s` seconds.
//!
//! # Usage
//!
//! ```bash
//! # Run until SIGINT/SIGTERM
//! thermo
//!
//! # Submit one batch and exit
//! thermo --once --config ./agent.toml
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use thermo_agent::config::default_config_path;
use thermo_agent::probe::SysinfoProbe;
use thermo_agent::{Agent, AgentConfig, TcpTransport};

/// thermo - temperature telemetry agent
#[derive(Parser, Debug)]
#[command(name = "thermo", version, about)]
struct Args {
    /// Path to agent.toml (created with defaults if missing)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Submit a single batch and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("thermo=info".parse()?)
                .add_directive("thermo_agent=info".parse()?)
                .add_directive("thermo_core=info".parse()?)
                .add_directive("thermo_protocol=info".parse()?),
        )
        .init();

    let config_path = args.config.unwrap_or_else(default_config_path);
    let config = AgentConfig::load_or_init(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        location = %config.location,
        config = %config_path.display(),
        "thermo agent starting"
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

    let agent = Agent::new(
        config,
        SysinfoProbe::new(),
        Arc::new(TcpTransport::new()),
        cancel_token,
    );

    if args.once {
        let outcome = agent.run_once().await.context("Submission failed")?;
        println!(
            "written: {}, failed: {}, skipped: {}",
            outcome.success_count, outcome.failure_count, outcome.skipped_count
        );
        return Ok(());
    }

    if let Err(e) = agent.run().await {
        error!(error = %e, "Giving up on registry session");
        return Err(e.into());
    }
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
