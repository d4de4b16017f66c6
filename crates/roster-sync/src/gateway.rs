use async_trait::async_trait;
use roster_model::RawRecord;
use roster_types::{EntityKind, OperationKind, RecordKey, StagedOperation};
use serde::{Deserialize, Serialize};

use crate::error::GatewayResult;

/// Acknowledgement of a successfully applied operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub key: RecordKey,
    pub operation: OperationKind,
}

impl Ack {
    pub fn for_operation(op: &StagedOperation) -> Self {
        Self { key: op.key(), operation: op.kind }
    }
}

/// Read side of a remote system: full record listings, re-fetched from
/// scratch every pass.
#[async_trait]
pub trait SnapshotFeed: Send + Sync {
    async fn fetch_all(&self, kind: EntityKind) -> GatewayResult<Vec<RawRecord>>;
}

/// A remote system the engine can write to.
#[async_trait]
pub trait Gateway: SnapshotFeed {
    async fn apply(&self, op: &StagedOperation) -> GatewayResult<Ack>;
}
