#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use std::path::Path;
use std::time::Duration;

#[allow(dead_code)]
pub const CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a `pokedb` command isolated from the user's config and terminal.
#[allow(dead_code)]
pub fn pokedb_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pokedb"));
    cmd.timeout(CMD_TIMEOUT);
    cmd.env_remove("POKEDB_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd.env("NO_COLOR", "1");
    cmd
}

/// Write a config file pointing the fetcher at `api_base_url` with fast retries.
#[allow(dead_code)]
pub fn write_config(dir: &Path, api_base_url: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    let content = format!(
        "[fetch]\napi_base_url = \"{api_base_url}\"\nmax_retries = 0\nbase_delay_ms = 1\ntimeout_secs = 5\n"
    );
    std::fs::write(&path, content).expect("failed to write test config");
    path
}
