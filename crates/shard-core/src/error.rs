//! Error types for the core crate.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while parsing core types or configuration.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid resource version {value:?} on {kind} {name}")]
    ResourceVersion {
        kind: &'static str,
        name: String,
        value: String,
    },

    #[error("invalid storage cluster id {0:?}: expected an integer in 0..=255")]
    StorageClusterId(String),

    #[error("invalid cache key {0:?}")]
    CacheKey(String),

    #[error("failed to read config: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    ConfigInvalid(String),
}
