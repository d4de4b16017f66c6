use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unrecognized role code: {0:?}")]
    UnrecognizedRole(String),

    #[error("unknown entity kind: {0:?}")]
    UnknownKind(String),
}
