//! MoveRelay CLI — the main entry point.
//!
//! Commands:
//! - `run`      — Relay Discord DMs to the agent until Ctrl-C
//! - `withdraw` — Invoke the Echelon withdraw tool directly
//! - `onboard`  — Write a default config file
//! - `doctor`   — Report config and secret status

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "moverelay",
    about = "MoveRelay — Discord DM relay to an on-chain Aptos agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.moverelay/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Discord relay
    Run,

    /// Withdraw from an Echelon position without going through the agent
    Withdraw {
        /// Tool input, e.g. '{"name":"USDT","amount":1.5}'
        #[arg(short, long)]
        input: String,
    },

    /// Write a default configuration file
    Onboard {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Diagnose configuration and secrets
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .unwrap_or_else(moverelay_config::AppConfig::config_path);

    match cli.command {
        Commands::Run => commands::run::run(&config_path).await?,
        Commands::Withdraw { input } => commands::withdraw::run(&config_path, &input).await?,
        Commands::Onboard { force } => commands::onboard::run(&config_path, force).await?,
        Commands::Doctor => commands::doctor::run(&config_path).await?,
    }

    Ok(())
}
