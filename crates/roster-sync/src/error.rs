use std::fmt;

use roster_diff::DiffError;
use roster_model::Side;
use roster_types::EntityKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sequencer::SequenceError;

/// Classification of a failure reported by a remote system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorKind {
    RateLimited,
    ValidationRejected,
    Unauthorized,
    Transient,
}

impl GatewayErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::ValidationRejected => "validation_rejected",
            Self::Unauthorized => "unauthorized",
            Self::Transient => "transient",
        }
    }
}

impl fmt::Display for GatewayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure at the gateway boundary.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    /// HTTP-style status, when the remote returned one.
    pub status: Option<u16>,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), status: None }
    }

    /// Classify an HTTP-style status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => GatewayErrorKind::RateLimited,
            401 | 403 => GatewayErrorKind::Unauthorized,
            400 | 404 | 409 | 422 => GatewayErrorKind::ValidationRejected,
            _ => GatewayErrorKind::Transient,
        };
        Self { kind, message: message.into(), status: Some(status) }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::RateLimited, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::ValidationRejected, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Unauthorized, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Transient, message)
    }

    /// Unauthorized stops every remaining submission of the pass.
    pub fn is_fatal(&self) -> bool {
        self.kind == GatewayErrorKind::Unauthorized
    }
}

/// Convenience alias for gateway results.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that end a pass early.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetching {kind} records from the {side} failed: {source}")]
    Fetch {
        side: Side,
        kind: EntityKind,
        #[source]
        source: GatewayError,
    },

    #[error("configuration error: {0}")]
    Configuration(#[from] SequenceError),

    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("target refused credentials: {0}")]
    Unauthorized(GatewayError),

    #[error("pass cancelled")]
    Cancelled,

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let kind = |s| GatewayError::from_status(s, "x").kind;
        assert_eq!(kind(429), GatewayErrorKind::RateLimited);
        assert_eq!(kind(401), GatewayErrorKind::Unauthorized);
        assert_eq!(kind(403), GatewayErrorKind::Unauthorized);
        for s in [400, 404, 409, 422] {
            assert_eq!(kind(s), GatewayErrorKind::ValidationRejected);
        }
        assert_eq!(kind(500), GatewayErrorKind::Transient);
        assert_eq!(kind(503), GatewayErrorKind::Transient);
        assert_eq!(GatewayError::from_status(404, "gone").status, Some(404));
    }

    #[test]
    fn only_unauthorized_is_fatal() {
        assert!(GatewayError::unauthorized("token expired").is_fatal());
        assert!(!GatewayError::rate_limited("slow down").is_fatal());
        assert!(!GatewayError::rejected("bad grade").is_fatal());
    }

    #[test]
    fn display() {
        let err = GatewayError::rejected("GradeLevel out of range");
        assert_eq!(err.to_string(), "validation_rejected: GradeLevel out of range");
    }
}
