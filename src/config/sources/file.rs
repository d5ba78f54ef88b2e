//! File sources: the global config file and explicitly named files.

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File};
use std::path::{Path, PathBuf};

/// `<config dir>/nodestash/config.toml`, when the platform has one
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "nodestash", "nodestash")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Add the global config file if it exists.
pub fn add_global(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match global_config_path() {
        Some(path) => add_to_builder(builder, &path, false),
        None => Ok(builder),
    }
}

/// Add a config file; its format follows the file extension.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    path: &Path,
    required: bool,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder.add_source(File::from(path).required(required)))
}
