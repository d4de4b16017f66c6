//! Per-kind comparison of source and target records.
//!
//! The differ is a pure function of the two record sets: the same inputs
//! always produce the same change set, and comparing a set with itself
//! produces nothing.

use std::collections::{BTreeMap, BTreeSet};

use roster_model::Snapshot;
use roster_types::{CanonicalRecord, EntityKind, RecordKey, StagedOperation};
use tracing::debug;

use crate::change_set::ChangeSet;
use crate::error::{DiffError, DiffResult};

/// Per-kind differ settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiffOptions {
    /// When false, records missing or inactive in the source are left alone
    /// on the target instead of being deactivated.
    pub allow_deactivate: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            allow_deactivate: true,
        }
    }
}

/// Compute the change set for one kind between two snapshots.
///
/// Records a snapshot rejected still exist in that system. A key the source
/// could not map is held: its target record is never deactivated. A key the
/// target could not map is known to exist there, so an active source record
/// under it is written as an `Update` rather than a `Create`.
pub fn diff(
    kind: EntityKind,
    source: &Snapshot,
    target: &Snapshot,
    options: &DiffOptions,
) -> DiffResult<ChangeSet> {
    let empty = BTreeMap::new();
    let unreadable = Unreadable {
        source: source.rejected_keys(kind),
        target: target.rejected_keys(kind),
    };
    compare(
        kind,
        source.kind_map(kind).unwrap_or(&empty),
        target.kind_map(kind).unwrap_or(&empty),
        &unreadable,
        options,
    )
}

/// Compute the change set for one kind between two keyed record sets.
///
/// - active in source, absent in target: `Create`
/// - active in source, different in target (including inactive): `Update`
///   carrying the source record
/// - active in target, absent or inactive in source: `Deactivate` carrying
///   the target record, unless deactivation is disabled
/// - anything else: no operation
pub fn diff_records(
    kind: EntityKind,
    source: &BTreeMap<RecordKey, CanonicalRecord>,
    target: &BTreeMap<RecordKey, CanonicalRecord>,
    options: &DiffOptions,
) -> DiffResult<ChangeSet> {
    compare(kind, source, target, &Unreadable::default(), options)
}

/// Keys present in a system whose records could not be mapped.
#[derive(Default)]
struct Unreadable {
    source: BTreeSet<RecordKey>,
    target: BTreeSet<RecordKey>,
}

fn compare(
    kind: EntityKind,
    source: &BTreeMap<RecordKey, CanonicalRecord>,
    target: &BTreeMap<RecordKey, CanonicalRecord>,
    unreadable: &Unreadable,
    options: &DiffOptions,
) -> DiffResult<ChangeSet> {
    check_records(kind, source)?;
    check_records(kind, target)?;

    let mut operations = Vec::new();

    for (key, src) in source {
        let tgt = target.get(key);
        if src.is_active() {
            match tgt {
                None if unreadable.target.contains(key) => {
                    operations.push(StagedOperation::update(src.clone()))
                }
                None => operations.push(StagedOperation::create(src.clone())),
                Some(tgt) if tgt != src => operations.push(StagedOperation::update(src.clone())),
                Some(_) => {}
            }
        } else if let Some(tgt) = tgt {
            if tgt.is_active() && options.allow_deactivate {
                operations.push(StagedOperation::deactivate(tgt));
            }
        }
    }

    if options.allow_deactivate {
        for (key, tgt) in target {
            if tgt.is_active() && !source.contains_key(key) {
                if unreadable.source.contains(key) {
                    debug!(key = %key, "source record unreadable, deactivation held");
                    continue;
                }
                operations.push(StagedOperation::deactivate(tgt));
            }
        }
    }

    let changes = ChangeSet::from_operations(kind, operations);
    debug!(
        kind = %kind,
        creates = changes.creates(),
        updates = changes.updates(),
        deactivates = changes.deactivates(),
        "change set computed"
    );
    Ok(changes)
}

fn check_records(kind: EntityKind, records: &BTreeMap<RecordKey, CanonicalRecord>) -> DiffResult<()> {
    for (key, record) in records {
        if record.kind() != kind {
            return Err(DiffError::KindMismatch {
                expected: kind,
                key: key.clone(),
            });
        }
        let actual = record.key();
        if &actual != key {
            return Err(DiffError::KeyMismatch {
                stored: key.clone(),
                actual,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use roster_model::{MappingContext, RawRecord, Side, SnapshotBuilder};
    use roster_types::{OperationKind, Role, Section, Student};

    fn student(id: &str, grade: i32, active: bool) -> CanonicalRecord {
        CanonicalRecord::Student(Student {
            id: id.into(),
            org_id: "501".into(),
            first_name: "Ada".into(),
            middle_name: None,
            last_name: "Lovelace".into(),
            email: None,
            grade_level: grade,
            login_id: "loveada".into(),
            active,
        })
    }

    fn snapshot(records: Vec<CanonicalRecord>) -> Snapshot {
        Snapshot::from_records(records)
    }

    fn students(source: Vec<CanonicalRecord>, target: Vec<CanonicalRecord>) -> ChangeSet {
        diff(
            EntityKind::Student,
            &snapshot(source),
            &snapshot(target),
            &DiffOptions::default(),
        )
        .unwrap()
    }

    /// What the target looks like once every operation has succeeded.
    fn apply_all(target: &Snapshot, changes: &ChangeSet) -> Snapshot {
        let mut applied = target.clone();
        for op in changes.iter() {
            applied.upsert(op.record.clone());
        }
        applied
    }

    #[test]
    fn identical_snapshots_no_diff() {
        let records = vec![student("1", 9, true), student("2", 10, false)];
        assert!(students(records.clone(), records).is_empty());
    }

    #[test]
    fn new_active_student_is_created() {
        let changes = students(vec![student("1", 9, true)], vec![]);
        assert_eq!(changes.creates(), 1);
        assert_eq!(changes.operations()[0].record, student("1", 9, true));
    }

    #[test]
    fn changed_field_is_a_full_update() {
        let changes = students(vec![student("1", 10, true)], vec![student("1", 9, true)]);
        assert_eq!(changes.updates(), 1);
        assert_eq!(changes.operations()[0].record, student("1", 10, true));
    }

    #[test]
    fn reactivation_is_an_update() {
        let changes = students(vec![student("1", 9, true)], vec![student("1", 9, false)]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.updates(), 1);
    }

    #[test]
    fn inactive_in_source_deactivates_target_record() {
        let changes = students(vec![student("1", 10, false)], vec![student("1", 9, true)]);
        assert_eq!(changes.len(), 1);
        let op = &changes.operations()[0];
        assert_eq!(op.kind, OperationKind::Deactivate);
        // payload is the target record, inactive
        assert_eq!(op.record, student("1", 9, false));
    }

    #[test]
    fn missing_from_source_deactivates() {
        let changes = students(vec![], vec![student("1", 9, true), student("2", 9, false)]);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.deactivates(), 1);
        assert_eq!(
            changes.deactivated_keys().collect::<Vec<_>>(),
            vec![RecordKey::student("1")]
        );
    }

    #[test]
    fn inactive_everywhere_is_steady_state() {
        assert!(students(vec![student("1", 9, false)], vec![]).is_empty());
        assert!(students(vec![student("1", 9, false)], vec![student("1", 12, false)]).is_empty());
    }

    #[test]
    fn deactivation_can_be_disabled() {
        let options = DiffOptions {
            allow_deactivate: false,
        };
        let changes = diff(
            EntityKind::Student,
            &snapshot(vec![student("2", 9, false)]),
            &snapshot(vec![student("1", 9, true), student("2", 9, true)]),
            &options,
        )
        .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn operations_are_ordered_by_key() {
        let changes = students(
            vec![student("3", 9, true), student("1", 9, true)],
            vec![student("2", 9, true)],
        );
        let keys: Vec<_> = changes.iter().map(StagedOperation::key).collect();
        assert_eq!(
            keys,
            vec![
                RecordKey::student("1"),
                RecordKey::student("2"),
                RecordKey::student("3"),
            ]
        );
    }

    #[test]
    fn only_the_requested_kind_is_compared() {
        let section = CanonicalRecord::Section(Section {
            id: "7".into(),
            org_id: "501".into(),
            course_code: "ENG".into(),
            name: "English".into(),
            teacher_id: None,
            product_codes: Default::default(),
            start_date: None,
            active: true,
        });
        let changes = students(vec![section], vec![]);
        assert!(changes.is_empty());
    }

    #[test]
    fn mismatched_record_kind_is_rejected() {
        let mut records = BTreeMap::new();
        records.insert(RecordKey::student("1"), student("1", 9, true));
        let err = diff_records(
            EntityKind::Section,
            &records,
            &BTreeMap::new(),
            &DiffOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DiffError::KindMismatch { .. }));

        let mut misfiled = BTreeMap::new();
        misfiled.insert(RecordKey::student("2"), student("1", 9, true));
        let err = diff_records(
            EntityKind::Student,
            &misfiled,
            &BTreeMap::new(),
            &DiffOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DiffError::KeyMismatch { .. }));
    }

    #[test]
    fn enrollment_role_change_is_an_update() {
        let enrollment = |role| {
            CanonicalRecord::Enrollment(roster_types::Enrollment {
                member_id: "T1".into(),
                section_id: "7".into(),
                role,
                active: true,
            })
        };
        let changes = diff(
            EntityKind::Enrollment,
            &snapshot(vec![enrollment(Role::Mentor)]),
            &snapshot(vec![enrollment(Role::Teacher)]),
            &DiffOptions::default(),
        )
        .unwrap();
        assert_eq!(changes.updates(), 1);
    }

    fn raw_student(id: &str, email: &str) -> RawRecord {
        RawRecord::new()
            .with("eduid", id)
            .with("school_id", "501")
            .with("first_name", "Ada")
            .with("last_name", "Lovelace")
            .with("grade_level", 9)
            .with("email", email)
    }

    fn mapped(side: Side, kind: EntityKind, rows: &[RawRecord]) -> Snapshot {
        let ctx = MappingContext::new(chrono::NaiveDate::from_ymd_opt(2024, 9, 1).unwrap());
        let mut builder = SnapshotBuilder::new(side, &ctx);
        builder.extend(kind, rows);
        builder.build()
    }

    #[test]
    fn unmappable_source_record_is_not_deactivated() {
        let source = mapped(Side::Source, EntityKind::Student, &[raw_student("1", "ada at example")]);
        assert_eq!(source.rejections().len(), 1);
        let target = snapshot(vec![student("1", 9, true), student("2", 9, true)]);

        let changes = diff(EntityKind::Student, &source, &target, &DiffOptions::default()).unwrap();
        assert_eq!(
            changes.deactivated_keys().collect::<Vec<_>>(),
            vec![RecordKey::student("2")]
        );
    }

    #[test]
    fn unmappable_target_record_is_updated_not_created() {
        let source = snapshot(vec![student("1", 9, true), student("2", 9, true)]);
        let broken = RawRecord::new().with("ImportUserId", "1").with("ImportOrgId", "501");
        let target = mapped(Side::Target, EntityKind::Student, &[broken]);
        assert!(target.is_empty());

        let changes = diff(EntityKind::Student, &source, &target, &DiffOptions::default()).unwrap();
        let ops: Vec<_> = changes.iter().map(|op| (op.kind, op.key())).collect();
        assert_eq!(
            ops,
            vec![
                (OperationKind::Update, RecordKey::student("1")),
                (OperationKind::Create, RecordKey::student("2")),
            ]
        );
    }

    fn arb_students() -> impl Strategy<Value = Vec<CanonicalRecord>> {
        prop::collection::btree_map(0u8..16, (9i32..12, any::<bool>()), 0..12).prop_map(|m| {
            m.into_iter()
                .map(|(id, (grade, active))| student(&id.to_string(), grade, active))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn diff_with_self_is_empty(records in arb_students()) {
            let s = snapshot(records);
            let changes = diff(EntityKind::Student, &s, &s, &DiffOptions::default()).unwrap();
            prop_assert!(changes.is_empty());
        }

        #[test]
        fn applying_the_diff_converges(source in arb_students(), target in arb_students()) {
            let source = snapshot(source);
            let target = snapshot(target);
            let changes = diff(EntityKind::Student, &source, &target, &DiffOptions::default()).unwrap();
            let applied = apply_all(&target, &changes);
            let rerun = diff(EntityKind::Student, &source, &applied, &DiffOptions::default()).unwrap();
            prop_assert!(rerun.is_empty(), "rerun produced {:?}", rerun);
        }

        #[test]
        fn deactivation_is_complete_and_exclusive(source in arb_students(), target in arb_students()) {
            let source = snapshot(source);
            let target = snapshot(target);
            let changes = diff(EntityKind::Student, &source, &target, &DiffOptions::default()).unwrap();

            for tgt in target.records(EntityKind::Student).filter(|r| r.is_active()) {
                let key = tgt.key();
                let retired = source.get(&key).map_or(true, |s| !s.is_active());
                let ops: Vec<_> = changes.iter().filter(|op| op.key() == key).collect();
                if retired {
                    prop_assert_eq!(ops.len(), 1);
                    prop_assert_eq!(ops[0].kind, OperationKind::Deactivate);
                } else {
                    prop_assert!(ops.iter().all(|op| op.kind != OperationKind::Deactivate));
                }
            }
            let creates_only_absent = changes.iter().all(|op| {
                op.kind != OperationKind::Create || target.get(&op.key()).is_none()
            });
            prop_assert!(creates_only_absent);
        }
    }
}
