//! Careline CLI: the main entry point.
//!
//! Commands:
//! - `ask`: Answer a single message
//! - `chat`: Interactive conversation
//! - `config`: Show or initialize configuration
//! - `doctor`: Diagnose configuration and provider health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "careline",
    about = "Careline: hospital help-line assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.careline/config.toml)
    #[arg(short, long, global = true, env = "CARELINE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single message and exit
    Ask {
        /// The message text
        #[arg(short, long)]
        message: String,

        /// Where the text came from: text, voice or document
        #[arg(long, default_value = "text")]
        modality: String,

        /// JSON file with earlier turns: [{"role": "user", "text": "..."}]
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Start an interactive conversation
    Chat,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose configuration and provider health
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Write a starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only answers
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Ask {
            message,
            modality,
            history,
        } => commands::ask::run(config_path, &message, &modality, history.as_deref()).await?,
        Commands::Chat => commands::chat::run(config_path).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Init { force } => commands::config_cmd::init(config_path, force)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
        },
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
