//! Error types for the diff crate.

use roster_types::{EntityKind, RecordKey};

/// Errors that can occur during diff operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    /// A record set handed to the differ held a record of another kind.
    #[error("record {key} is not a {expected} record")]
    KindMismatch { expected: EntityKind, key: RecordKey },

    /// A record was stored under a key that is not its own.
    #[error("record stored under {stored} has identity {actual}")]
    KeyMismatch { stored: RecordKey, actual: RecordKey },
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
