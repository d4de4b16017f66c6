use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use roster_types::{CanonicalRecord, EntityKind, RecordKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::context::MappingContext;
use crate::error::{MappingError, MappingResult};
use crate::raw::RawRecord;
use crate::{source, target};

/// Which system a snapshot was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }

    fn map(
        &self,
        kind: EntityKind,
        raw: &RawRecord,
        ctx: &MappingContext,
    ) -> MappingResult<CanonicalRecord> {
        match self {
            Self::Source => source::map_record(kind, raw, ctx),
            Self::Target => target::map_record(kind, raw, ctx),
        }
    }

    fn identity_hint(&self, kind: EntityKind, raw: &RawRecord) -> Option<String> {
        match self {
            Self::Source => source::identity_hint(kind, raw),
            Self::Target => target::identity_hint(kind, raw),
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that could not be admitted into a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MappingRejection {
    pub side: Side,
    pub kind: EntityKind,
    /// Identity of the record as far as it could be read.
    pub identity: Option<String>,
    pub error: MappingError,
}

impl MappingRejection {
    /// Key of the rejected record, when its identity could be read.
    pub fn key(&self) -> Option<RecordKey> {
        RecordKey::from_identity(self.kind, self.identity.as_deref()?)
    }
}

/// Canonical records of one system, keyed per kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    records: BTreeMap<EntityKind, BTreeMap<RecordKey, CanonicalRecord>>,
    rejections: Vec<MappingRejection>,
}

impl Snapshot {
    /// Build a snapshot directly from canonical records. The first record
    /// seen for a key wins.
    pub fn from_records(records: impl IntoIterator<Item = CanonicalRecord>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            snapshot
                .records
                .entry(record.kind())
                .or_default()
                .entry(record.key())
                .or_insert(record);
        }
        snapshot
    }

    /// Records of one kind, ordered by key. Empty if the kind was not fetched.
    pub fn records(&self, kind: EntityKind) -> impl Iterator<Item = &CanonicalRecord> {
        self.records.get(&kind).into_iter().flat_map(|m| m.values())
    }

    /// The keyed map for one kind, if any records of that kind exist.
    pub fn kind_map(&self, kind: EntityKind) -> Option<&BTreeMap<RecordKey, CanonicalRecord>> {
        self.records.get(&kind)
    }

    pub fn get(&self, key: &RecordKey) -> Option<&CanonicalRecord> {
        self.records.get(&key.kind())?.get(key)
    }

    /// Keys of every active record, across all kinds.
    pub fn active_keys(&self) -> BTreeSet<RecordKey> {
        self.records
            .values()
            .flat_map(|m| m.iter())
            .filter(|(_, r)| r.is_active())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.records.get(&kind).map_or(0, BTreeMap::len)
    }

    pub fn len(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rejections(&self) -> &[MappingRejection] {
        &self.rejections
    }

    /// Keys of records of `kind` that exist in the system but could not be
    /// mapped. Duplicates of an admitted key are not included.
    pub fn rejected_keys(&self, kind: EntityKind) -> BTreeSet<RecordKey> {
        self.rejections
            .iter()
            .filter(|r| r.kind == kind && !matches!(r.error, MappingError::DuplicateKey(_)))
            .filter_map(MappingRejection::key)
            .collect()
    }

    /// Apply an operation's payload, as the target would after a
    /// successful submission.
    pub fn upsert(&mut self, record: CanonicalRecord) {
        self.records
            .entry(record.kind())
            .or_default()
            .insert(record.key(), record);
    }
}

/// Maps raw records of one system into a [`Snapshot`], enforcing key
/// uniqueness and the exclusion list.
pub struct SnapshotBuilder<'a> {
    side: Side,
    ctx: &'a MappingContext,
    exclude: BTreeSet<String>,
    snapshot: Snapshot,
}

impl<'a> SnapshotBuilder<'a> {
    pub fn new(side: Side, ctx: &'a MappingContext) -> Self {
        Self {
            side,
            ctx,
            exclude: BTreeSet::new(),
            snapshot: Snapshot::default(),
        }
    }

    /// Member ids (students or staff) the engine must never touch. Their
    /// records and their enrollments are dropped from the snapshot.
    pub fn exclude<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Map and admit one raw record.
    pub fn add(&mut self, kind: EntityKind, raw: &RawRecord) {
        let record = match self.side.map(kind, raw, self.ctx) {
            Ok(record) => record,
            Err(error) => {
                let identity = self.side.identity_hint(kind, raw);
                warn!(
                    side = self.side.as_str(),
                    kind = %kind,
                    identity = identity.as_deref().unwrap_or("?"),
                    error = %error,
                    "record rejected"
                );
                self.reject(kind, identity, error);
                return;
            }
        };

        let key = record.key();
        if key
            .member_id()
            .is_some_and(|member| self.exclude.contains(member))
        {
            debug!(side = self.side.as_str(), key = %key, "excluded record dropped");
            return;
        }

        let records = self.snapshot.records.entry(kind).or_default();
        if records.contains_key(&key) {
            warn!(side = self.side.as_str(), key = %key, "duplicate identity key");
            self.reject(kind, Some(key.identity()), MappingError::DuplicateKey(key));
            return;
        }
        records.insert(key, record);
    }

    pub fn extend<'r>(&mut self, kind: EntityKind, rows: impl IntoIterator<Item = &'r RawRecord>) {
        for raw in rows {
            self.add(kind, raw);
        }
    }

    pub fn build(self) -> Snapshot {
        debug!(
            side = self.side.as_str(),
            records = self.snapshot.len(),
            rejected = self.snapshot.rejections.len(),
            "snapshot built"
        );
        self.snapshot
    }

    fn reject(&mut self, kind: EntityKind, identity: Option<String>, error: MappingError) {
        self.snapshot.rejections.push(MappingRejection {
            side: self.side,
            kind,
            identity,
            error,
        });
    }
}
