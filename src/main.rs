use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use backspace::config::AppConfig;
use backspace::server;

#[derive(Parser)]
#[command(name = "backspace")]
#[command(version, about = "Turns natural-language change requests into GitHub pull requests")]
pub struct Cli {
    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory for per-job clone workspaces (overrides WORKSPACE_ROOT)
    #[arg(long)]
    pub workspace_root: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset, e.g. "info" or "backspace=debug"
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .compact()
        .init();

    let mut config = AppConfig::from_env().context("Invalid configuration")?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(root) = cli.workspace_root {
        config.workspace_root = root;
    }

    server::start_server(config).await
}
