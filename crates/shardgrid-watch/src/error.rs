use thiserror::Error;

pub type WatchResult<T> = Result<T, WatchError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchError {
    /// Listing the initial state failed.
    #[error("list {kind} failed: {message}")]
    List { kind: &'static str, message: String },

    /// Establishing a watch failed.
    #[error("watch {kind} failed: {message}")]
    Watch { kind: &'static str, message: String },

    /// The requested resource version is too old; a relist is required.
    #[error("resource version {0} expired")]
    Expired(String),

    /// A source failed to start; message comes from the underlying client.
    #[error("{0}")]
    Source(String),

    /// Errors recorded by an aggregated watcher, in registration order.
    #[error("{} watch source(s) failed: {}", .0.len(), .0.join("; "))]
    Aggregate(Vec<String>),
}
