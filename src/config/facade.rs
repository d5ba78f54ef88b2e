//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::StashConfig;
use config::ConfigError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the global file and environment.
    pub fn load() -> Result<StashConfig, ConfigError> {
        MergeService::load(None)
    }

    /// Load configuration with an explicit file layered over the global one.
    pub fn load_with(path: Option<&Path>) -> Result<StashConfig, ConfigError> {
        MergeService::load(path)
    }

    /// Load configuration from a specific file only (plus environment).
    pub fn load_from_file(path: &Path) -> Result<StashConfig, ConfigError> {
        MergeService::load_from_file(path)
    }

    /// Create default configuration.
    pub fn default() -> StashConfig {
        StashConfig::default()
    }
}
