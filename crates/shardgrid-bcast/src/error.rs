use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("broadcast group {0:?} is closed")]
    Closed(String),

    #[error("broadcast group {name:?} already registered with a different message type")]
    TypeMismatch { name: String },
}
