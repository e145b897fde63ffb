//! Loading router configuration for the command line.
//!
//! Precedence, lowest first: built-in defaults, the config file, the
//! environment, then command-line flags. A missing config file is not an error.

use sagemcom_core::config::RouterConfig;
use sagemcom_core::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::cli::Cli;

/// Directory under the user config directory.
pub const USER_CONFIG_DIR: &str = "sagemcom";

/// Config filename.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// Default location of the config file.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join(USER_CONFIG_DIR))
        .unwrap_or_else(|| PathBuf::from(".config").join(USER_CONFIG_DIR))
        .join(USER_CONFIG_FILE)
}

/// Read a config file, falling back to defaults when it does not exist.
///
/// # Errors
///
/// Returns [`Error::ConfigError`] if the file exists but cannot be read or
/// parsed.
pub fn load_file(path: &Path) -> Result<RouterConfig> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            debug!(path = %path.display(), "loading config file");
            toml::from_str(&contents).map_err(|e| {
                Error::ConfigError(format!("failed to parse {}: {e}", path.display()))
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            Ok(RouterConfig::default())
        }
        Err(e) => Err(Error::ConfigError(format!(
            "failed to read {}: {e}",
            path.display()
        ))),
    }
}

/// Build the effective configuration for a command-line invocation.
///
/// # Errors
///
/// Returns [`Error::ConfigError`] for unreadable files or invalid values.
pub fn load(cli: &Cli) -> Result<RouterConfig> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = apply_flags(load_file(&path)?.with_env_overrides(), cli);
    config.check()?;
    Ok(config)
}

fn apply_flags(mut config: RouterConfig, cli: &Cli) -> RouterConfig {
    if let Some(host) = &cli.host {
        config = config.with_host(host.trim());
    }
    if let Some(item) = &cli.onepassword_item {
        config = config.with_onepassword_item(item.clone());
    }
    config
}
