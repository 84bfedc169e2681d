//! Configuration for snapshot runs.
//!
//! Settings are read from a TOML file. Lookup order:
//!
//! 1. An explicit path (the CLI's `--config`)
//! 2. `$POKEDB_CONFIG`
//! 3. `config.toml` in the platform config directory
//!    (`~/.config/pokedb/config.toml` on Linux)
//!
//! A missing file yields the defaults; a malformed one is an error.
//!
//! ```toml
//! [fetch]
//! api_base_url = "https://pokeapi.co/api/v2/"
//! timeout_secs = 15
//! max_retries = 3
//! max_concurrency = 8
//!
//! [collect]
//! max_workers = 16
//! time_budget_secs = 1800
//!
//! [paths]
//! output_root = "data/api"
//! changelog_dir = "data/changes"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "POKEDB_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upstream access
    pub fetch: FetchConfig,
    /// Worker pool and time budget
    pub collect: CollectConfig,
    /// Output and change-log locations
    pub paths: PathsConfig,
}

/// How the canonical source is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Base URL of the REST API, with trailing slash
    pub api_base_url: String,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Extra attempts after the first for retryable failures
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay
    pub max_backoff_ms: u64,
    /// Ceiling on simultaneous network calls
    pub max_concurrency: usize,
    /// `limit` used when listing a whole endpoint
    pub list_limit: u32,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://pokeapi.co/api/v2/".to_string(),
            timeout_secs: 15,
            max_retries: 3,
            base_delay_ms: 250,
            max_backoff_ms: 4_000,
            max_concurrency: 8,
            list_limit: 3_000,
            user_agent: concat!("pokedb/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Collection worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Entity tasks in flight at once
    pub max_workers: usize,
    /// Wall-clock budget for the whole run
    pub time_budget_secs: Option<u64>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            max_workers: 16,
            time_budget_secs: None,
        }
    }
}

impl CollectConfig {
    /// The time budget as a duration.
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget_secs.map(Duration::from_secs)
    }
}

/// File system locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory the `gen-N` snapshots are written under
    pub output_root: PathBuf,
    /// Directory of per-entity change-log files, if any
    pub changelog_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("data").join("api"),
            changelog_dir: None,
        }
    }
}

impl Config {
    /// Load from an explicit path, `$POKEDB_CONFIG`, or the platform default.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(Path::new(&path));
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse a config file; the file must exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Platform config file location.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "pokedb", "pokedb")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject settings the collector cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.api_base_url.trim().is_empty() {
            return Err(Error::Config("fetch.api_base_url must not be empty".into()));
        }
        url::Url::parse(&self.fetch.api_base_url)
            .map_err(|e| Error::Config(format!("fetch.api_base_url is not a URL: {e}")))?;
        if self.fetch.timeout_secs == 0 {
            return Err(Error::Config("fetch.timeout_secs must be positive".into()));
        }
        if self.fetch.max_concurrency == 0 {
            return Err(Error::Config("fetch.max_concurrency must be positive".into()));
        }
        if self.collect.max_workers == 0 {
            return Err(Error::Config("collect.max_workers must be positive".into()));
        }
        Ok(())
    }
}
