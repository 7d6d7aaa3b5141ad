//! Tally command-line driver
//!
//! Launches deployments from configuration, applies whitelist files and runs
//! scripted scenarios. Results are printed as JSON on stdout; logs go to
//! stderr.

mod commands;
mod scenario;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_shared::{AppConfig, AppError};

/// Tally ledger and sale engine driver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "tally")]
struct Cli {
    /// Extra configuration file layered over config/default
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch a deployment and print its initial state
    Deploy,

    /// Apply a whitelist file (`[{"address", "status"}]`) to a fresh deployment
    Whitelist {
        /// Path to the whitelist JSON file
        file: PathBuf,

        /// Override the configured batch size
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Run a scripted scenario and print the resulting state
    Run {
        /// Path to the scenario JSON file
        scenario: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(err) = execute(&cli) {
        let status = err.downcast_ref::<AppError>().map_or(1, AppError::status_code);
        error!(status, "{err:#}");
        std::process::exit(i32::from(status));
    }
    Ok(())
}

fn execute(cli: &Cli) -> anyhow::Result<()> {
    let config = AppConfig::load_from(cli.config.as_deref()).map_err(AppError::from)?;

    match &cli.command {
        Command::Deploy => commands::deploy(&config),
        Command::Whitelist { file, batch_size } => commands::whitelist(&config, file, *batch_size),
        Command::Run { scenario } => commands::run(&config, scenario),
    }
}
