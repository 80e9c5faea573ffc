//! Apixt - command line host
//!
//! Sends requests to the active API environment and renders the streamed
//! response tree as JSON on stdout. Logs go to stderr.

mod cli;
mod commands;

use std::path::PathBuf;

use apixt_infrastructure::SettingsRepository;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::commands::{Loaded, apply_env_overrides};

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn load(path: Option<PathBuf>) -> anyhow::Result<Loaded> {
    let path = path.or_else(|| std::env::var_os("APIXT_SETTINGS").map(PathBuf::from));
    let repository = path.map_or_else(SettingsRepository::new, SettingsRepository::at);
    let mut settings = repository.load().await?;
    let base_url = apply_env_overrides(&mut settings)?;
    Ok(Loaded {
        repository,
        settings,
        base_url,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!("Starting apixt v{}", env!("CARGO_PKG_VERSION"));

    let loaded = load(cli.settings).await?;
    match cli.command {
        Command::Stream(args) => commands::stream(loaded, args).await,
        Command::Replay(args) => commands::replay(loaded, args).await,
        Command::Settings(command) => commands::settings(loaded, command).await,
    }
}
