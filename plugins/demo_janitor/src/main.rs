use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use demo_janitor::{
    config::{Cli, Config},
    plugin::{self, Mode},
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli)?;
    let level = if cfg.logging_enabled { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // stdout carries the protocol in stdio mode
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.stdio {
        Mode::Stdio
    } else if cli.once {
        Mode::Once
    } else {
        Mode::Standalone
    };
    plugin::run(mode, cfg).await
}
