#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod catalog;
mod repl;

use args::{Args, Command};
use clap::Parser;
use himmi_client::ControlPlaneClient;
use himmi_config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_found = args.config.exists();
    let config = if config_found {
        Config::load(&args.config)?
    } else {
        Config::default()
    };

    let _telemetry_guard = himmi_telemetry::init(config.telemetry.as_ref(), "warn")?;

    if config_found {
        tracing::debug!(config_path = %args.config.display(), "configuration loaded");
    } else {
        tracing::debug!(config_path = %args.config.display(), "config file not found, using defaults");
    }

    let control_plane = ControlPlaneClient::new(config.control_plane.base_url.clone())?;

    match args.command.unwrap_or_default() {
        Command::Models => catalog::print(&control_plane, args.provider.as_deref()).await,
        Command::Chat => repl::run(&config, control_plane, &args).await,
    }
}
