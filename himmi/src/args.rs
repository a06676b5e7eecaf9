use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Himmi playground
#[derive(Debug, Parser)]
#[command(name = "himmi", about = "Chat with models behind the Himmi gateway and compare them side by side")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "himmi.toml", env = "HIMMI_CONFIG")]
    pub config: PathBuf,

    /// Model slug to chat with
    #[arg(short, long)]
    pub model: Option<String>,

    /// Gateway API key
    #[arg(long, env = "HIMMI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Also ask a shadow model and vote on the better answer
    #[arg(long)]
    pub shadow: bool,

    /// Only list models published by this provider
    #[arg(long)]
    pub provider: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Default, Subcommand)]
pub enum Command {
    /// Start an interactive chat
    #[default]
    Chat,
    /// List available models and their pricing
    Models,
}
