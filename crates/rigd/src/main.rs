//! rigd — the riglab control-plane daemon.
//!
//! Single binary that assembles the fleet subsystems:
//! - Fleet registry
//! - Connectivity daemon (fed by the transport integration)
//! - Bootloader poller (when configured)
//! - Recovery daemon
//!
//! # Usage
//!
//! ```text
//! rigd run --config /etc/riglab/fleet.toml
//! rigd config > fleet.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;

use rig_core::FleetConfig;
use rig_fleet::FleetManager;
use rig_monitor::RebootUnavailable;
use rig_registry::FleetRegistry;

#[derive(Parser)]
#[command(name = "rigd", about = "riglab fleet control-plane daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane with all background daemons.
    Run {
        /// Path to a fleet config TOML file; defaults apply if omitted.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the default configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "info,rigd=debug,rig_fleet=debug,rig_monitor=debug"
                        .parse()
                        .unwrap()
                }),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { config } => run(config).await,
        Command::Config => {
            print!("{}", toml::to_string_pretty(&FleetConfig::default())?);
            Ok(())
        }
    }
}

async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => {
            let config = FleetConfig::from_file(&path)?;
            info!(?path, "fleet config loaded");
            config
        }
        None => FleetConfig::default(),
    };

    let registry = FleetRegistry::new();
    let manager = FleetManager::new(registry, config).with_recovery_strategy(Arc::new(
        RebootUnavailable::new(Duration::from_secs(60)),
    ));

    // The transport integration feeds connectivity notices through
    // this channel; it stays open for the life of the process.
    let (_notice_tx, notice_rx) = mpsc::channel(64);
    manager.init(notice_rx).await?;
    info!("riglab control plane running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;

    let listing = manager.describe_fleet().await?;
    info!(fleet = %serde_json::to_string(&listing)?, "final fleet status");
    manager.terminate().await?;
    Ok(())
}
