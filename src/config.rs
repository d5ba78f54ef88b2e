//! Configuration
//!
//! Layered settings for opening a store: built-in defaults, then the global
//! config file, then an explicit config file, then `NODESTASH__*` environment
//! variables (`__` separates nested keys, e.g. `NODESTASH__STORAGE__BACKEND`).

pub mod facade;
pub mod merge;
pub mod sources;

pub use facade::ConfigLoader;

use crate::error::{Result, StoreError};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "NODESTASH";

/// Which [`crate::store::Backend`] a container is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sled,
    Memory,
}

fn default_cache_capacity() -> u64 {
    64 * 1024 * 1024
}

fn default_flush_every_ms() -> Option<u64> {
    Some(500)
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store directory; `None` means the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub backend: BackendKind,

    /// Page cache size of the sled backend
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity_bytes: u64,

    /// Background flush interval of the sled backend; `None` disables it
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: Option<u64>,

    /// Stage writes in an in-memory scratch container until saved
    #[serde(default)]
    pub proxied: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            backend: BackendKind::default(),
            cache_capacity_bytes: default_cache_capacity(),
            flush_every_ms: default_flush_every_ms(),
            proxied: false,
        }
    }
}

impl StorageConfig {
    /// Configured store directory, or `<data dir>/nodestash/store`
    pub fn resolve_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            if !path.as_os_str().is_empty() {
                return Ok(path.clone());
            }
        }
        let dirs = directories::ProjectDirs::from("", "nodestash", "nodestash").ok_or_else(|| {
            StoreError::Config("Could not determine platform data directory for the store".to_string())
        })?;
        Ok(dirs.data_dir().join("store"))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StashConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}
