//! Logging initialization and configuration.
//!
//! Log lines go to stderr so stdout stays free for the run summary. `RUST_LOG`
//! takes precedence over `-v`/`-q` when set.

use anyhow::Result;
use colored::control as color_control;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::cli::{Cli, LogFormat};

/// Level implied by the verbosity flags.
pub const fn level_for(cli: &Cli) -> Level {
    if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    }
}

/// Initialize the logging subsystem based on CLI flags.
///
/// # Errors
///
/// Returns an error if the global tracing subscriber cannot be set.
pub fn initialize_logging(cli: &Cli) -> Result<()> {
    let no_color = std::env::var_os("NO_COLOR").is_some();
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level_for(cli)).into())
        .from_env_lossy();

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_ansi(!no_color)
        .with_writer(std::io::stderr);

    match cli.log_format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish())?,
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
    }

    if no_color {
        color_control::set_override(false);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_level_follows_flags() {
        let parse = |args: &[&str]| Cli::try_parse_from(args).unwrap();
        assert_eq!(level_for(&parse(&["pokedb", "--all"])), Level::INFO);
        assert_eq!(level_for(&parse(&["pokedb", "--all", "-v"])), Level::DEBUG);
        assert_eq!(level_for(&parse(&["pokedb", "--all", "-q"])), Level::ERROR);
    }
}
