// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::ServerConfig;
use crate::config::validate::validate_config;
use crate::errors::Result;

/// Load a configuration file from a given path.
///
/// This only performs TOML deserialization; defaults are **not** applied.
/// Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ServerConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: ServerConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file and run [`validate_config`] on it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ServerConfig> {
    let mut config = load_from_path(&path)?;
    validate_config(&mut config)?;
    Ok(config)
}

/// Config path used when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("srvhooks.toml")
}
