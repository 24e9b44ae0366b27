//! CLI-side configuration: `GlobalOpts`-aware wrappers over
//! `tripwire-config`, plus coordinator construction.

use std::path::PathBuf;
use std::sync::Arc;

use tripwire_config::{Config, FileThresholdSource};
use tripwire_core::{FileStore, MonitoringCoordinator, Sources};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// `--config` / `TRIPWIRE_CONFIG`, else the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(tripwire_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = config_file(global);
    tripwire_config::load_config_from(&path).map_err(|e| CliError::config(&path, e))
}

/// `--state-dir` wins over the config file.
pub fn state_dir(global: &GlobalOpts, cfg: &Config) -> PathBuf {
    global.state_dir.clone().unwrap_or_else(|| cfg.state_dir())
}

/// Wire a coordinator over the on-disk state and live system sources.
pub fn build_coordinator(
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<MonitoringCoordinator, CliError> {
    let path = config_file(global);
    let monitor = cfg
        .to_monitor_config()
        .map_err(|e| CliError::config(&path, e))?;

    let dir = state_dir(global, cfg);
    let store = FileStore::open(&dir)?;
    tracing::debug!(state_dir = %dir.display(), "state store opened");

    let thresholds = FileThresholdSource::new(path, cfg.threshold_set());

    Ok(MonitoringCoordinator::new(
        monitor,
        Arc::new(store),
        Sources::system(),
        Arc::new(thresholds),
    ))
}
