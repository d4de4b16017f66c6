use roster_types::{EntityKind, OperationKind, RecordKey, StagedOperation};
use serde::{Deserialize, Serialize};

/// The operations needed to bring one kind of record on the target into
/// agreement with the source, ordered by identity key ascending.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub kind: EntityKind,
    operations: Vec<StagedOperation>,
}

impl ChangeSet {
    /// Create an empty change set.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            operations: Vec::new(),
        }
    }

    /// Build a change set, sorting the operations by key.
    pub fn from_operations(kind: EntityKind, mut operations: Vec<StagedOperation>) -> Self {
        operations.sort_by_key(StagedOperation::key);
        Self { kind, operations }
    }

    /// Returns `true` if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn operations(&self) -> &[StagedOperation] {
        &self.operations
    }

    pub fn into_operations(self) -> Vec<StagedOperation> {
        self.operations
    }

    pub fn iter(&self) -> impl Iterator<Item = &StagedOperation> {
        self.operations.iter()
    }

    /// Number of creates.
    pub fn creates(&self) -> usize {
        self.count(OperationKind::Create)
    }

    /// Number of updates.
    pub fn updates(&self) -> usize {
        self.count(OperationKind::Update)
    }

    /// Number of deactivations.
    pub fn deactivates(&self) -> usize {
        self.count(OperationKind::Deactivate)
    }

    /// Keys of the records this change set deactivates.
    pub fn deactivated_keys(&self) -> impl Iterator<Item = RecordKey> + '_ {
        self.operations
            .iter()
            .filter(|op| op.kind == OperationKind::Deactivate)
            .map(StagedOperation::key)
    }

    fn count(&self, kind: OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind == kind).count()
    }
}

impl IntoIterator for ChangeSet {
    type Item = StagedOperation;
    type IntoIter = std::vec::IntoIter<StagedOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}
