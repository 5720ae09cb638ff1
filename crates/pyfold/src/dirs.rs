//! Platform directories used by pyfold

use std::path::PathBuf;

use etcetera::{BaseStrategy, choose_base_strategy};

/// Name of the configuration file, both per-user and per-project
pub const CONFIG_FILE_NAME: &str = "pyfold.toml";

/// Directory holding the per-user configuration, e.g. `~/.config/pyfold`.
pub fn user_config_dir() -> Option<PathBuf> {
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("pyfold"))
}

/// Path of the per-user configuration file, if a config directory exists
pub fn user_config_file() -> Option<PathBuf> {
    user_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}
