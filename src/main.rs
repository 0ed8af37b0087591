//! alertmon CLI: run the alert manager or validate its configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use alertmon::{Config, MemStore, Notifier};

#[derive(Parser)]
#[command(name = "alertmon")]
#[command(about = "Track operational alerts and notify configured targets")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(
        long,
        short,
        global = true,
        env = "ALERTMON_CONFIG",
        default_value = "/etc/alertmon/config.yaml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the alert manager
    Run,
    /// Validate the configuration file and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check => {
            Config::load(&cli.config)?;
            println!("configuration ok");
            Ok(())
        }
        Commands::Run => run(&cli.config).await,
    }
}

async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;

    let store = match &config.store.path {
        Some(path) => MemStore::open(path)?,
        None => MemStore::new(),
    };
    let store = Arc::new(store);

    let notifier = Notifier::new(&config.notifier, store).await?;
    notifier.start().await;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    notifier.close().await;
    Ok(())
}
