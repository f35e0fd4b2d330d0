use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dockhand::api;
use dockhand::config::ConfigStore;
use dockhand::fleet::CommandExecutor;

#[derive(Debug, Parser)]
#[command(name = "dockhand", about = "Docker fleet management over SSH", version)]
struct Cli {
    /// Directory holding config.yaml and the SSH private keys it references
    #[arg(long, default_value = "data")]
    config_dir: PathBuf,

    /// Address the HTTP/WebSocket API listens on
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config_dir = PathBuf::from(shellexpand::tilde(&cli.config_dir.to_string_lossy()).as_ref());
    info!(config_dir = %config_dir.display(), "Loading configuration");

    let store = ConfigStore::open(&config_dir)
        .with_context(|| format!("Failed to load config from {}", config_dir.display()))?;

    info!(groups = store.get().groups().len(), "Configuration loaded");

    let executor = Arc::new(CommandExecutor::new(store).await);
    api::serve(&cli.listen, executor)
        .await
        .with_context(|| format!("API server failed on {}", cli.listen))?;

    Ok(())
}
