//! Mixer GW binary - runs either half of the bridge.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mixer_gw::config::AppConfig;
use mixer_gw::endpoint::Endpoint;
use mixer_gw::gateway::Gateway;
use mixer_gw::host::SimHost;

/// Mixer GW - bridge an OSC mixer GUI to a DAW control-surface endpoint
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: CommandArgs,
}

#[derive(Subcommand, Debug)]
enum CommandArgs {
    /// Run the gateway (hub) between the GUI and the IPC endpoint
    Gateway,
    /// Run a standalone IPC endpoint against a simulated host
    Endpoint {
        /// Number of simulated regular tracks (master is always present)
        #[arg(long, default_value = "8")]
        tracks: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting Mixer GW...");
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load_or_default(&args.config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    match args.command {
        CommandArgs::Gateway => {
            let gateway = Gateway::new(config.gateway);
            gateway.run(shutdown_rx).await?;
        }
        CommandArgs::Endpoint { tracks } => {
            info!("Simulated host with {} tracks (plus master)", tracks);
            let host = Arc::new(SimHost::new(tracks));
            let endpoint = Endpoint::new(config.endpoint, host);
            endpoint.serve(shutdown_rx).await?;
        }
    }

    info!("Mixer GW shutdown complete");
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}
