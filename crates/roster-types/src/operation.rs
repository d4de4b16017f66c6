use std::fmt;

use serde::{Deserialize, Serialize};

use crate::key::RecordKey;
use crate::kind::EntityKind;
use crate::record::CanonicalRecord;

/// The action a staged operation performs on the learning platform.
///
/// There is no delete: removal is always a deactivation, which the
/// platform treats idempotently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Deactivate,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Deactivate => "deactivate",
        }
    }

    /// Create and Update both leave the record present and active remotely.
    pub fn is_upsert(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending action against the target system, not yet submitted.
///
/// The payload is always the full canonical record, never a delta: the
/// platform is not assumed to support partial patches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedOperation {
    pub kind: OperationKind,
    pub record: CanonicalRecord,
}

impl StagedOperation {
    pub fn create(record: CanonicalRecord) -> Self {
        Self { kind: OperationKind::Create, record }
    }

    pub fn update(record: CanonicalRecord) -> Self {
        Self { kind: OperationKind::Update, record }
    }

    /// Stage a deactivation. The payload is forced inactive.
    pub fn deactivate(record: &CanonicalRecord) -> Self {
        Self {
            kind: OperationKind::Deactivate,
            record: record.with_active(false),
        }
    }

    pub fn key(&self) -> RecordKey {
        self.record.key()
    }

    pub fn entity(&self) -> EntityKind {
        self.record.kind()
    }
}

impl fmt::Display for StagedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key())
    }
}
