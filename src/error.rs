//! Error types for the persistence layer.
//!
//! Configuration-time misuse (registry conflicts) and structural corruption are
//! raised; corruption confined to a single field is recovered by the record
//! codec and reported through [`crate::codec::record::broken_entries`].

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A record kind or descriptor is already bound to something else
    #[error("Duplicate type registration: {0}")]
    DuplicateType(String),

    /// No handler can be resolved for a descriptor or kind name
    #[error("Unregistered type: {0}")]
    UnregisteredType(String),

    /// A required column or field has no stored data and no default
    #[error("Missing field '{field}' at {path}")]
    MissingField { path: String, field: String },

    /// Stored structure cannot be navigated (unknown kind, absent nested record)
    #[error("Schema error at {path}: {reason}")]
    Schema { path: String, reason: String },

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A façade field was requested that was never declared (or with the wrong kind)
    #[error("Undeclared field: {0}")]
    UndeclaredField(String),

    #[error("Migration for version {0} already registered")]
    DuplicateMigration(String),

    #[error("Invalid version string: {0}")]
    InvalidVersion(String),

    /// Field-level decode failure; recoverable by the record codec
    #[error("Corrupt data at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Storage backend error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Encoding error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn schema(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Schema {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_field(path: impl Into<String>, field: impl Into<String>) -> Self {
        StoreError::MissingField {
            path: path.into(),
            field: field.into(),
        }
    }

    /// Whether the record codec may recover from this error by substituting a default.
    pub fn is_field_local(&self) -> bool {
        matches!(self, StoreError::Corrupt { .. } | StoreError::Codec(_))
    }
}

impl From<config::ConfigError> for StoreError {
    fn from(err: config::ConfigError) -> Self {
        StoreError::Config(err.to_string())
    }
}
