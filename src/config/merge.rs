//! Merge policy: defaults every source is layered over.

pub mod service;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder seeded with the defaults for keys other sources commonly override.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("storage.backend", "sled")?
        .set_default("storage.proxied", false)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")
}
