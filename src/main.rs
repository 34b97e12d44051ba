use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use web_ssh_bridge::cli::{Cli, Commands, run_encrypt, run_serve, run_status};
use web_ssh_bridge::config::{default_config_path, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    let is_server = matches!(cli.command, None | Some(Commands::Serve { .. }));

    // Logs go to stderr; `encrypt` prints its result on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(!is_server)
        .init();

    let config_path = cli.config.unwrap_or_else(default_config_path);

    info!(config = %config_path.display(), "Loading configuration");

    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!(hosts = config.hosts.len(), "Configuration loaded");

    match cli.command {
        None => run_serve(config, None).await?,
        Some(Commands::Serve { listen }) => run_serve(config, listen).await?,
        Some(Commands::Encrypt { key_index }) => {
            run_encrypt(&config, key_index).context("Failed to encrypt secret")?;
        }
        Some(Commands::Status) => run_status(&config),
    }

    Ok(())
}
