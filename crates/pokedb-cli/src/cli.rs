//! # CLI Structure and Argument Parsing
//!
//! `pokedb` builds one generation snapshot per invocation. Categories are
//! given positionally, or all of them with `--all`:
//!
//! ```bash
//! # Everything, as of the latest generation
//! pokedb --all
//!
//! # Moves and abilities as they stood in generation 3
//! pokedb move ability --gen 3
//!
//! # Bounded run with scraped change logs, replacing an earlier snapshot
//! pokedb --all --gen 1 --time-budget 1800 --changelog-dir data/changes --force
//! ```
//!
//! Flags override the matching config file values.

use clap::{ArgGroup, Parser, ValueEnum};
use pokedb_core::ResourceKind;
use std::path::PathBuf;

/// Main CLI structure for the `pokedb` command
#[derive(Parser, Clone, Debug)]
#[command(name = "pokedb")]
#[command(version)]
#[command(about = "pokedb - Generation-accurate PokéAPI snapshots", long_about = None)]
#[command(group(ArgGroup::new("selection").required(true).args(["kinds", "all"])))]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Categories to collect
    #[arg(value_enum, value_name = "KIND")]
    pub kinds: Vec<KindArg>,

    /// Collect every category
    #[arg(long, conflicts_with = "kinds")]
    pub all: bool,

    /// Target generation (defaults to, and is clamped to, the latest)
    #[arg(long = "gen", value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub generation: Option<u32>,

    /// Share in-flight requests but keep nothing between them
    #[arg(long)]
    pub no_cache: bool,

    /// Stop dispatching work after this many seconds
    #[arg(long, value_name = "SECS")]
    pub time_budget: Option<u64>,

    /// Concurrent entity tasks
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..=64))]
    pub workers: Option<u64>,

    /// Root directory for `gen-N` snapshots
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Path to configuration file (overrides autodiscovery). Also via `POKEDB_CONFIG`.
    #[arg(long, value_name = "FILE", env = "POKEDB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of scraped change-log files
    #[arg(long, value_name = "DIR")]
    pub changelog_dir: Option<PathBuf>,

    /// Replace an existing snapshot of the same generation
    #[arg(long)]
    pub force: bool,

    /// Debug logging
    #[arg(short = 'v', long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show errors
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl Cli {
    /// Categories to collect, in the order given.
    pub fn selected_kinds(&self) -> Vec<ResourceKind> {
        if self.all {
            return ResourceKind::COLLECTABLE.to_vec();
        }
        let mut kinds: Vec<ResourceKind> = Vec::with_capacity(self.kinds.len());
        for kind in self.kinds.iter().map(|k| k.kind()) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }
}

/// Collectable categories as spelled on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// Abilities
    #[value(alias = "abilities")]
    Ability,
    /// Items
    #[value(alias = "items")]
    Item,
    /// Moves
    #[value(alias = "moves")]
    Move,
    /// Species, written as their default pokemon
    #[value(alias = "pokemon")]
    Species,
}

impl KindArg {
    /// Core kind for this argument.
    pub const fn kind(self) -> ResourceKind {
        match self {
            Self::Ability => ResourceKind::Ability,
            Self::Item => ResourceKind::Item,
            Self::Move => ResourceKind::Move,
            Self::Species => ResourceKind::Species,
        }
    }
}

/// Log line format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}
