//! MergeService: orchestrates sources, applies merge policy, deserializes to StashConfig.

use super::builder_with_defaults;
use crate::config::sources::{environment, file};
use crate::config::StashConfig;
use config::ConfigError;
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Load config from standard sources.
    /// Precedence: global file (lowest) -> explicit file -> environment (highest).
    pub fn load(explicit: Option<&Path>) -> Result<StashConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = file::add_global(builder)?;
        let builder = match explicit {
            Some(path) => file::add_to_builder(builder, path, true)?,
            None => builder,
        };
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load config from a specific file with environment overlay.
    pub fn load_from_file(path: &Path) -> Result<StashConfig, ConfigError> {
        let builder = builder_with_defaults()?;
        let builder = file::add_to_builder(builder, path, true)?;
        let builder = environment::add_to_builder(builder)?;

        let config = builder.build()?;
        config.try_deserialize()
    }
}
