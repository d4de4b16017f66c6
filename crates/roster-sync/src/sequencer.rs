//! Cross-kind ordering of staged operations.
//!
//! Change sets are computed per kind; this module merges them into a plan
//! whose order respects references between kinds. Staff are written before
//! the sections they teach, parents before the enrollments that point at
//! them, and deactivations run the same edges in reverse.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::fmt;

use roster_diff::ChangeSet;
use roster_model::Snapshot;
use roster_types::{EntityKind, OperationKind, RecordKey, StagedOperation};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A plan that cannot be applied as given.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("{operation} references {missing}, which is neither staged nor present on the target")]
    UnresolvedReference {
        operation: RecordKey,
        missing: RecordKey,
    },
}

/// Identities that will exist and be active on the target without any
/// operation in the current pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresenceIndex {
    keys: BTreeSet<RecordKey>,
}

impl PresenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active target records, minus everything this pass deactivates.
    pub fn build(target: &Snapshot, change_sets: &[ChangeSet]) -> Self {
        let mut keys = target.active_keys();
        for changes in change_sets {
            for key in changes.deactivated_keys() {
                keys.remove(&key);
            }
        }
        Self { keys }
    }

    pub fn insert(&mut self, key: RecordKey) {
        self.keys.insert(key);
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<RecordKey> for PresenceIndex {
    fn from_iter<I: IntoIterator<Item = RecordKey>>(iter: I) -> Self {
        Self { keys: iter.into_iter().collect() }
    }
}

/// A group of operations with no dependency edges between them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    StaffUpserts,
    /// Students and sections.
    ParentUpserts,
    EnrollmentUpserts,
    EnrollmentDeactivates,
    /// Sections and students.
    ParentDeactivates,
    StaffDeactivates,
}

impl Tier {
    pub const ALL: [Tier; 6] = [
        Tier::StaffUpserts,
        Tier::ParentUpserts,
        Tier::EnrollmentUpserts,
        Tier::EnrollmentDeactivates,
        Tier::ParentDeactivates,
        Tier::StaffDeactivates,
    ];

    fn of(op: &StagedOperation) -> Self {
        match (op.entity(), op.kind.is_upsert()) {
            (EntityKind::Staff, true) => Self::StaffUpserts,
            (EntityKind::Student | EntityKind::Section, true) => Self::ParentUpserts,
            (EntityKind::Enrollment, true) => Self::EnrollmentUpserts,
            (EntityKind::Enrollment, false) => Self::EnrollmentDeactivates,
            (EntityKind::Student | EntityKind::Section, false) => Self::ParentDeactivates,
            (EntityKind::Staff, false) => Self::StaffDeactivates,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StaffUpserts => "staff upserts",
            Self::ParentUpserts => "parent upserts",
            Self::EnrollmentUpserts => "enrollment upserts",
            Self::EnrollmentDeactivates => "enrollment deactivates",
            Self::ParentDeactivates => "parent deactivates",
            Self::StaffDeactivates => "staff deactivates",
        };
        f.write_str(name)
    }
}

/// One tier of a plan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTier {
    pub tier: Tier,
    pub operations: Vec<StagedOperation>,
}

/// Operations in submission order, partitioned into tiers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedPlan {
    tiers: Vec<PlanTier>,
}

impl SequencedPlan {
    /// Non-empty tiers in submission order.
    pub fn tiers(&self) -> &[PlanTier] {
        &self.tiers
    }

    pub fn into_tiers(self) -> Vec<PlanTier> {
        self.tiers
    }

    /// Every operation, in submission order.
    pub fn operations(&self) -> impl Iterator<Item = &StagedOperation> {
        self.tiers.iter().flat_map(|t| t.operations.iter())
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(|t| t.operations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Submission index of the operation on `key`, if one is planned.
    pub fn position(&self, key: &RecordKey) -> Option<usize> {
        self.operations().position(|op| &op.key() == key)
    }
}

/// Merges per-kind change sets into a dependency-respecting plan.
pub struct Sequencer;

impl Sequencer {
    /// Order the operations of `change_sets`.
    ///
    /// Creates and updates run in kind precedence order (Staff, Student,
    /// Section, Enrollment), deactivations in the reverse order, and
    /// operations of one kind by identity key. Staff sit in tiers of their
    /// own because sections reference their teacher. Fails if an enrollment
    /// create or update references a record that is neither staged for
    /// creation or update nor in `presence`.
    pub fn sequence(
        change_sets: Vec<ChangeSet>,
        presence: &PresenceIndex,
    ) -> Result<SequencedPlan, SequenceError> {
        let mut buckets: [Vec<StagedOperation>; 6] = Default::default();
        for op in change_sets.into_iter().flatten() {
            let index = Tier::of(&op) as usize;
            buckets[index].push(op);
        }
        for (tier, bucket) in Tier::ALL.into_iter().zip(buckets.iter_mut()) {
            if tier == Tier::ParentDeactivates {
                bucket.sort_by_key(|op| (Reverse(op.entity()), op.key()));
            } else {
                bucket.sort_by_key(StagedOperation::key);
            }
        }

        let staged: BTreeSet<RecordKey> = buckets[Tier::StaffUpserts as usize]
            .iter()
            .chain(&buckets[Tier::ParentUpserts as usize])
            .map(StagedOperation::key)
            .collect();
        for op in &buckets[Tier::EnrollmentUpserts as usize] {
            for reference in op.record.references() {
                if !staged.contains(&reference) && !presence.contains(&reference) {
                    return Err(SequenceError::UnresolvedReference {
                        operation: op.key(),
                        missing: reference,
                    });
                }
            }
        }

        let tiers: Vec<PlanTier> = Tier::ALL
            .into_iter()
            .zip(buckets)
            .filter(|(_, ops)| !ops.is_empty())
            .map(|(tier, operations)| PlanTier { tier, operations })
            .collect();

        let plan = SequencedPlan { tiers };
        debug!(operations = plan.len(), tiers = plan.tiers.len(), "plan sequenced");
        Ok(plan)
    }
}

/// Planned operation counts per kind and action.
pub fn planned_counts(plan: &SequencedPlan) -> Vec<(EntityKind, OperationKind, usize)> {
    let mut counts = Vec::new();
    for kind in EntityKind::ALL {
        for action in [OperationKind::Create, OperationKind::Update, OperationKind::Deactivate] {
            let n = plan
                .operations()
                .filter(|op| op.entity() == kind && op.kind == action)
                .count();
            if n > 0 {
                counts.push((kind, action, n));
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_types::{CanonicalRecord, Enrollment, Role, Section, Staff, Student};

    fn student(id: &str) -> CanonicalRecord {
        CanonicalRecord::Student(Student {
            id: id.into(),
            org_id: "501".into(),
            first_name: "Ada".into(),
            middle_name: None,
            last_name: "Lovelace".into(),
            email: None,
            grade_level: 9,
            login_id: "loveada".into(),
            active: true,
        })
    }

    fn staff(id: &str) -> CanonicalRecord {
        CanonicalRecord::Staff(Staff {
            id: id.into(),
            org_id: "501".into(),
            first_name: "Grace".into(),
            middle_name: None,
            last_name: "Hopper".into(),
            email: None,
            login_id: "hopgrac".into(),
            role: Role::Teacher,
            active: true,
        })
    }

    fn section(id: &str) -> CanonicalRecord {
        CanonicalRecord::Section(Section {
            id: id.into(),
            org_id: "501".into(),
            course_code: "ENG".into(),
            name: "English".into(),
            teacher_id: None,
            product_codes: Default::default(),
            start_date: None,
            active: true,
        })
    }

    fn enrollment(member: &str, section: &str, role: Role) -> CanonicalRecord {
        CanonicalRecord::Enrollment(Enrollment {
            member_id: member.into(),
            section_id: section.into(),
            role,
            active: true,
        })
    }

    fn change_set(kind: EntityKind, ops: Vec<StagedOperation>) -> ChangeSet {
        ChangeSet::from_operations(kind, ops)
    }

    #[test]
    fn parents_are_created_before_their_enrollments() {
        let plan = Sequencer::sequence(
            vec![
                change_set(
                    EntityKind::Enrollment,
                    vec![StagedOperation::create(enrollment("S1", "Sec1", Role::Student))],
                ),
                change_set(EntityKind::Section, vec![StagedOperation::create(section("Sec1"))]),
                change_set(EntityKind::Student, vec![StagedOperation::create(student("S1"))]),
            ],
            &PresenceIndex::new(),
        )
        .unwrap();

        let keys: Vec<_> = plan.operations().map(StagedOperation::key).collect();
        assert_eq!(
            keys,
            vec![
                RecordKey::student("S1"),
                RecordKey::section("Sec1"),
                RecordKey::enrollment("S1", "Sec1"),
            ]
        );
        assert_eq!(plan.tiers().len(), 2);
        assert_eq!(plan.tiers()[0].tier, Tier::ParentUpserts);
    }

    #[test]
    fn enrollment_deactivations_precede_parent_deactivations() {
        let plan = Sequencer::sequence(
            vec![
                change_set(
                    EntityKind::Student,
                    vec![StagedOperation::deactivate(&student("S1"))],
                ),
                change_set(
                    EntityKind::Section,
                    vec![StagedOperation::deactivate(&section("Sec1"))],
                ),
                change_set(
                    EntityKind::Staff,
                    vec![StagedOperation::deactivate(&staff("T1"))],
                ),
                change_set(
                    EntityKind::Enrollment,
                    vec![StagedOperation::deactivate(&enrollment("S1", "Sec1", Role::Student))],
                ),
            ],
            &PresenceIndex::new(),
        )
        .unwrap();

        let keys: Vec<_> = plan.operations().map(StagedOperation::key).collect();
        assert_eq!(
            keys,
            vec![
                RecordKey::enrollment("S1", "Sec1"),
                RecordKey::section("Sec1"),
                RecordKey::student("S1"),
                RecordKey::staff("T1"),
            ]
        );
    }

    #[test]
    fn staff_are_written_before_the_sections_they_teach() {
        let taught = match section("C1") {
            CanonicalRecord::Section(c) => CanonicalRecord::Section(Section {
                teacher_id: Some("T1".into()),
                ..c
            }),
            _ => unreachable!(),
        };
        let plan = Sequencer::sequence(
            vec![
                change_set(EntityKind::Section, vec![StagedOperation::create(taught.clone())]),
                change_set(EntityKind::Staff, vec![StagedOperation::create(staff("T1"))]),
            ],
            &PresenceIndex::new(),
        )
        .unwrap();
        let tiers: Vec<_> = plan
            .tiers()
            .iter()
            .map(|t| (t.tier, t.operations.iter().map(StagedOperation::key).collect::<Vec<_>>()))
            .collect();
        assert_eq!(
            tiers,
            vec![
                (Tier::StaffUpserts, vec![RecordKey::staff("T1")]),
                (Tier::ParentUpserts, vec![RecordKey::section("C1")]),
            ]
        );

        let retired = Sequencer::sequence(
            vec![
                change_set(EntityKind::Staff, vec![StagedOperation::deactivate(&staff("T1"))]),
                change_set(EntityKind::Section, vec![StagedOperation::deactivate(&taught)]),
            ],
            &PresenceIndex::new(),
        )
        .unwrap();
        let order: Vec<_> = retired.tiers().iter().map(|t| t.tier).collect();
        assert_eq!(order, vec![Tier::ParentDeactivates, Tier::StaffDeactivates]);
    }

    #[test]
    fn upserts_follow_kind_precedence_then_key() {
        let plan = Sequencer::sequence(
            vec![
                change_set(
                    EntityKind::Student,
                    vec![
                        StagedOperation::create(student("S2")),
                        StagedOperation::update(student("S1")),
                    ],
                ),
                change_set(EntityKind::Staff, vec![StagedOperation::create(staff("T1"))]),
            ],
            &PresenceIndex::new(),
        )
        .unwrap();
        let keys: Vec<_> = plan.operations().map(StagedOperation::key).collect();
        assert_eq!(
            keys,
            vec![
                RecordKey::staff("T1"),
                RecordKey::student("S1"),
                RecordKey::student("S2"),
            ]
        );
    }

    #[test]
    fn present_parents_satisfy_references() {
        let presence: PresenceIndex = [RecordKey::staff("T1"), RecordKey::section("Sec1")]
            .into_iter()
            .collect();
        let plan = Sequencer::sequence(
            vec![change_set(
                EntityKind::Enrollment,
                vec![StagedOperation::create(enrollment("T1", "Sec1", Role::Teacher))],
            )],
            &presence,
        )
        .unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn unresolved_reference_fails_fast() {
        let presence: PresenceIndex = [RecordKey::section("Sec1")].into_iter().collect();
        let err = Sequencer::sequence(
            vec![change_set(
                EntityKind::Enrollment,
                vec![StagedOperation::create(enrollment("S9", "Sec1", Role::Student))],
            )],
            &presence,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SequenceError::UnresolvedReference {
                operation: RecordKey::enrollment("S9", "Sec1"),
                missing: RecordKey::student("S9"),
            }
        );
    }

    #[test]
    fn presence_excludes_records_deactivated_this_pass() {
        let target = Snapshot::from_records(vec![student("S1"), section("Sec1")]);
        let deactivations = vec![change_set(
            EntityKind::Student,
            vec![StagedOperation::deactivate(&student("S1"))],
        )];
        let presence = PresenceIndex::build(&target, &deactivations);
        assert!(!presence.contains(&RecordKey::student("S1")));
        assert!(presence.contains(&RecordKey::section("Sec1")));
    }

    #[test]
    fn planned_counts_per_kind() {
        let plan = Sequencer::sequence(
            vec![change_set(
                EntityKind::Student,
                vec![
                    StagedOperation::create(student("S1")),
                    StagedOperation::create(student("S2")),
                    StagedOperation::deactivate(&student("S3")),
                ],
            )],
            &PresenceIndex::new(),
        )
        .unwrap();
        assert_eq!(
            planned_counts(&plan),
            vec![
                (EntityKind::Student, OperationKind::Create, 2),
                (EntityKind::Student, OperationKind::Deactivate, 1),
            ]
        );
        assert_eq!(plan.position(&RecordKey::student("S3")), Some(2));
    }

    #[test]
    fn empty_input_is_an_empty_plan() {
        let plan = Sequencer::sequence(Vec::new(), &PresenceIndex::new()).unwrap();
        assert!(plan.is_empty());
        assert!(plan.tiers().is_empty());
    }
}
