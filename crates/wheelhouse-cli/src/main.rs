//! wheelhouse CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wheelhouse_cli::cmd;
use wheelhouse_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; -v only changes the fallback level.
    let fallback = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Resolve { args, lock, json } => {
            cmd::resolve::resolve(config, &args, lock.as_deref(), json).await
        }
        Commands::Install { args, target, lock } => {
            cmd::install::install(config, &args, target, lock.as_deref()).await
        }
        Commands::Freeze { baseline, output } => {
            cmd::freeze::freeze(config, baseline, output.as_deref()).await
        }
        Commands::List { lock } => cmd::list::list(&lock).await,
    }
}
