//! Locating the Claude CLI executable.

use std::path::{Path, PathBuf};

use super::builder::BridgeConfig;
use crate::{Error, Result};

/// Executable name looked up on `PATH` when no override is configured.
pub const DEFAULT_CLI_NAME: &str = "claude";

/// Resolve the CLI executable for this configuration.
///
/// A configured `cli_path` wins: an explicit path must point at an existing
/// file, a bare name is looked up on `PATH`. Without an override `claude` is
/// looked up on `PATH`. Every failure is reported as
/// [`Error::CliNotFound`] naming what was searched.
pub fn resolve_cli(config: &BridgeConfig) -> Result<PathBuf> {
    match config.cli_path() {
        Some(path) if is_explicit_path(path) => {
            if path.is_file() {
                Ok(path.to_path_buf())
            } else {
                Err(Error::CliNotFound {
                    searched: path.display().to_string(),
                })
            }
        }
        Some(name) => lookup(&name.to_string_lossy()),
        None => lookup(DEFAULT_CLI_NAME),
    }
}

fn lookup(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|e| {
        tracing::debug!(name, error = %e, "CLI lookup on PATH failed");
        Error::CliNotFound {
            searched: format!("`{name}` in PATH"),
        }
    })
}

fn is_explicit_path(path: &Path) -> bool {
    path.is_absolute() || path.components().count() > 1
}
