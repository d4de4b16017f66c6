use std::fmt;

use serde::{Deserialize, Serialize};

use crate::kind::EntityKind;

/// Identity key of a canonical record.
///
/// People and sections are identified by their source-system id. An
/// enrollment is identified by who is enrolled in what, never by a
/// surrogate id, so re-syncing the same pair always lands on the same key.
///
/// The derived ordering sorts by kind precedence first, then by id, which
/// is the reproducible tie-break the sequencer relies on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKey {
    Staff { id: String },
    Student { id: String },
    Section { id: String },
    Enrollment { member: String, section: String },
}

impl RecordKey {
    pub fn staff(id: impl Into<String>) -> Self {
        Self::Staff { id: id.into() }
    }

    pub fn student(id: impl Into<String>) -> Self {
        Self::Student { id: id.into() }
    }

    pub fn section(id: impl Into<String>) -> Self {
        Self::Section { id: id.into() }
    }

    pub fn enrollment(member: impl Into<String>, section: impl Into<String>) -> Self {
        Self::Enrollment {
            member: member.into(),
            section: section.into(),
        }
    }

    /// The kind of record this key identifies.
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Staff { .. } => EntityKind::Staff,
            Self::Student { .. } => EntityKind::Student,
            Self::Section { .. } => EntityKind::Section,
            Self::Enrollment { .. } => EntityKind::Enrollment,
        }
    }

    /// The system-side identity: the id for people and sections,
    /// `member@section` for enrollments.
    pub fn identity(&self) -> String {
        match self {
            Self::Staff { id } | Self::Student { id } | Self::Section { id } => id.clone(),
            Self::Enrollment { member, section } => format!("{member}@{section}"),
        }
    }

    /// Inverse of [`identity`](Self::identity). Enrollment identities split
    /// on the last `@`.
    pub fn from_identity(kind: EntityKind, identity: &str) -> Option<Self> {
        match kind {
            EntityKind::Staff => Some(Self::staff(identity)),
            EntityKind::Student => Some(Self::student(identity)),
            EntityKind::Section => Some(Self::section(identity)),
            EntityKind::Enrollment => {
                let (member, section) = identity.rsplit_once('@')?;
                Some(Self::enrollment(member, section))
            }
        }
    }

    /// The member id this key refers to: the record's own id for people,
    /// the enrolled member for enrollments, `None` for sections.
    pub fn member_id(&self) -> Option<&str> {
        match self {
            Self::Staff { id } | Self::Student { id } => Some(id),
            Self::Enrollment { member, .. } => Some(member),
            Self::Section { .. } => None,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_kind_then_id() {
        let mut keys = vec![
            RecordKey::enrollment("S1", "C1"),
            RecordKey::section("C1"),
            RecordKey::student("S2"),
            RecordKey::student("S1"),
            RecordKey::staff("T9"),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                RecordKey::staff("T9"),
                RecordKey::student("S1"),
                RecordKey::student("S2"),
                RecordKey::section("C1"),
                RecordKey::enrollment("S1", "C1"),
            ]
        );
    }

    #[test]
    fn enrollment_identity_is_the_pair() {
        assert_eq!(
            RecordKey::enrollment("S1", "C1"),
            RecordKey::enrollment("S1", "C1")
        );
        assert_ne!(
            RecordKey::enrollment("S1", "C1"),
            RecordKey::enrollment("S1", "C2")
        );
    }

    #[test]
    fn display_format() {
        assert_eq!(RecordKey::student("42").to_string(), "student:42");
        assert_eq!(RecordKey::enrollment("42", "7").to_string(), "enrollment:42@7");
        assert_eq!(RecordKey::enrollment("42", "7").identity(), "42@7");
    }

    #[test]
    fn identity_parses_back() {
        let key = RecordKey::enrollment("42", "7");
        assert_eq!(RecordKey::from_identity(EntityKind::Enrollment, &key.identity()), Some(key));
        assert_eq!(
            RecordKey::from_identity(EntityKind::Section, "7"),
            Some(RecordKey::section("7"))
        );
        assert_eq!(RecordKey::from_identity(EntityKind::Enrollment, "42"), None);
    }

    #[test]
    fn kind_and_member() {
        let key = RecordKey::enrollment("42", "7");
        assert_eq!(key.kind(), EntityKind::Enrollment);
        assert_eq!(key.member_id(), Some("42"));
        assert_eq!(RecordKey::section("7").member_id(), None);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_value(RecordKey::enrollment("42", "7")).unwrap();
        assert_eq!(json["kind"], "enrollment");
        assert_eq!(json["member"], "42");
        assert_eq!(json["section"], "7");
    }
}
