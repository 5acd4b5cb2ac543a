//! Error types for the routing config synthesizer.

use thiserror::Error;

pub type HaproxyResult<T> = Result<T, HaproxyError>;

#[derive(Debug, Error)]
pub enum HaproxyError {
    #[error("at least one tenant partition ip is required")]
    NoTenantPartitions,

    /// More partitions than first letters to split between them.
    #[error("{count} tenant partitions given, at most {max} are supported")]
    TooManyTenantPartitions { count: usize, max: usize },

    #[error("invalid {role} ip {value:?}")]
    InvalidIp { role: &'static str, value: String },

    #[error("unknown tls mode {0:?}, expected bridging or offloading")]
    UnknownTlsMode(String),

    #[error("invalid connection timeout {0:?}")]
    InvalidTimeout(String),

    #[error("template references unknown placeholder {{{{ {0} }}}} on line {1}")]
    UnknownPlaceholder(String, usize),

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}
