//! Command handlers and the config plumbing they share.

pub mod config_cmd;
pub mod devices;
pub mod run;

use std::path::{Path, PathBuf};

use meater_config::{Config, ConfigError};
use meater_core::PollerConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// `--config` if given, otherwise the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(meater_config::config_path)
}

pub fn config_error(path: &Path, source: ConfigError) -> CliError {
    CliError::Config {
        path: path.display().to_string(),
        source,
    }
}

/// Load and validate the config file plus environment overrides.
pub fn load_config(global: &GlobalOpts) -> Result<(PathBuf, Config), CliError> {
    let path = config_file(global);
    let cfg = meater_config::load_config_from(&path).map_err(|e| config_error(&path, e))?;
    Ok((path, cfg))
}

/// Load the config and translate it for the poller.
pub fn poller_config(global: &GlobalOpts) -> Result<(PathBuf, PollerConfig), CliError> {
    let (path, cfg) = load_config(global)?;
    let poller = cfg.to_poller_config().map_err(|e| config_error(&path, e))?;
    Ok((path, poller))
}
