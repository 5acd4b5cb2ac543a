use thiserror::Error;

pub type SelectorResult<T> = Result<T, SelectorError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("invalid field selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("operator {op} is not supported for field {field}")]
    UnsupportedOperator { field: String, op: String },

    #[error("field {field} requires an integer value, got {value:?}")]
    NotAnInteger { field: String, value: String },

    #[error("invalid request path {0:?}")]
    InvalidPath(String),

    #[error("{kind} {name:?} not found in tenant {tenant:?}")]
    RoleNotFound {
        kind: String,
        tenant: String,
        name: String,
    },

    #[error("index {0:?} does not exist")]
    UnknownIndex(String),
}
