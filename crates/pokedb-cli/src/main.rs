//! pokedb CLI - Generation-accurate PokéAPI snapshots
//!
//! Parses flags, loads configuration, runs the collector and turns the
//! outcome into an exit code (see [`error`]).

use clap::Parser;
use pokedb_core::Config;
use std::process::ExitCode;
use tracing::error;

mod cli;
mod commands;
mod error;
mod utils;

use cli::Cli;
use error::{CliError, ErrorCategory};
use utils::initialize_logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(&cli) {
        eprintln!("Failed to initialize logging: {e}");
        return ErrorCategory::Internal.as_exit_code();
    }

    match run(&cli).await {
        Ok(None) => ExitCode::SUCCESS,
        Ok(Some(category)) => category.as_exit_code(),
        Err(e) => {
            error!("{:#}", e.source);
            e.as_exit_code()
        },
    }
}

/// Run the selected collection; `Some` carries a non-success status.
async fn run(cli: &Cli) -> Result<Option<ErrorCategory>, CliError> {
    let config = Config::load(cli.config.as_deref()).map_err(CliError::usage)?;
    let options = commands::CollectOptions::resolve(cli, &config);
    let outcome = commands::collect(&config, &options).await?;
    Ok(ErrorCategory::from_report(&outcome.report))
}
