use roster_types::RecordKey;

/// Errors produced while mapping a raw record into canonical form.
///
/// Mapping errors are never fatal to a pass: the offending record is left out
/// of the snapshot and reported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("missing required field `{0}`")]
    MissingField(String),

    #[error("unrecognized value {value:?} for field `{field}`")]
    UnrecognizedValue { field: String, value: String },

    #[error("invalid value {value:?} for field `{field}`: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("duplicate identity key {0}")]
    DuplicateKey(RecordKey),
}

impl MappingError {
    pub(crate) fn missing(field: &str) -> Self {
        Self::MissingField(field.to_string())
    }

    pub(crate) fn unrecognized(field: &str, value: impl Into<String>) -> Self {
        Self::UnrecognizedValue {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub(crate) fn invalid(field: &str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias for mapping results.
pub type MappingResult<T> = Result<T, MappingError>;
