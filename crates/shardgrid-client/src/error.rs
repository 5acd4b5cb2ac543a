use shardgrid_watch::WatchError;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Message an API server returns when it does not hold the requested shard.
pub const NOT_MY_SHARD_MARKER: &str = "no relationship found between node";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    #[error("resource version expired: {message}")]
    Gone { message: String },

    #[error("server returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("watch event exceeds {limit} bytes")]
    FrameTooLarge { limit: usize },

    #[error("no rest clients configured")]
    NoClients,

    #[error(transparent)]
    Watch(#[from] WatchError),
}

impl ClientError {
    /// The contacted server is healthy but does not own this data; the
    /// caller should try another partition.
    pub fn is_not_my_shard(&self) -> bool {
        matches!(self, ClientError::Forbidden { message } if message.contains(NOT_MY_SHARD_MARKER))
    }

    /// Status-code view of the error, where one exists.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Forbidden { .. } => Some(403),
            ClientError::Gone { .. } => Some(410),
            ClientError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}
