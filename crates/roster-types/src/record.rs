//! Canonical record shapes.
//!
//! Both systems' raw records are mapped into these types before any
//! comparison happens. Equality is plain field-by-field equality, which is
//! exactly the comparison the differ performs.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::key::RecordKey;
use crate::kind::EntityKind;
use crate::role::Role;

/// A student as understood by both systems.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub org_id: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: Option<String>,
    /// Kindergarten is 0, pre-kindergarten is -1.
    pub grade_level: i32,
    pub login_id: String,
    pub active: bool,
}

/// A staff member (teacher, mentor, coordinator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staff {
    pub id: String,
    pub org_id: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: Option<String>,
    pub login_id: String,
    pub role: Role,
    pub active: bool,
}

/// A classroom / course section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub org_id: String,
    pub course_code: String,
    pub name: String,
    pub teacher_id: Option<String>,
    pub product_codes: BTreeSet<String>,
    pub start_date: Option<NaiveDate>,
    pub active: bool,
}

/// Membership of a student or staff member in a section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub member_id: String,
    pub section_id: String,
    pub role: Role,
    pub active: bool,
}

impl Enrollment {
    /// Key of the enrolled member: a student for the student role, a staff
    /// member otherwise.
    pub fn member_key(&self) -> RecordKey {
        if self.role.is_student() {
            RecordKey::student(&self.member_id)
        } else {
            RecordKey::staff(&self.member_id)
        }
    }

    pub fn section_key(&self) -> RecordKey {
        RecordKey::section(&self.section_id)
    }
}

/// A canonical record of any kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanonicalRecord {
    Staff(Staff),
    Student(Student),
    Section(Section),
    Enrollment(Enrollment),
}

impl CanonicalRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Staff(_) => EntityKind::Staff,
            Self::Student(_) => EntityKind::Student,
            Self::Section(_) => EntityKind::Section,
            Self::Enrollment(_) => EntityKind::Enrollment,
        }
    }

    /// The record's identity key.
    pub fn key(&self) -> RecordKey {
        match self {
            Self::Staff(s) => RecordKey::staff(&s.id),
            Self::Student(s) => RecordKey::student(&s.id),
            Self::Section(s) => RecordKey::section(&s.id),
            Self::Enrollment(e) => RecordKey::enrollment(&e.member_id, &e.section_id),
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Self::Staff(s) => s.active,
            Self::Student(s) => s.active,
            Self::Section(s) => s.active,
            Self::Enrollment(e) => e.active,
        }
    }

    /// A copy of this record with the active flag set to `active`.
    pub fn with_active(&self, active: bool) -> Self {
        let mut record = self.clone();
        match &mut record {
            Self::Staff(s) => s.active = active,
            Self::Student(s) => s.active = active,
            Self::Section(s) => s.active = active,
            Self::Enrollment(e) => e.active = active,
        }
        record
    }

    /// Keys of the records this record depends on.
    pub fn references(&self) -> Vec<RecordKey> {
        match self {
            Self::Enrollment(e) => vec![e.member_key(), e.section_key()],
            Self::Section(c) => c.teacher_id.iter().map(RecordKey::staff).collect(),
            Self::Staff(_) | Self::Student(_) => Vec::new(),
        }
    }

    /// Organization (school) the record belongs to, if it has one.
    pub fn org_id(&self) -> Option<&str> {
        match self {
            Self::Staff(s) => Some(&s.org_id),
            Self::Student(s) => Some(&s.org_id),
            Self::Section(s) => Some(&s.org_id),
            Self::Enrollment(_) => None,
        }
    }
}

impl From<Student> for CanonicalRecord {
    fn from(s: Student) -> Self {
        Self::Student(s)
    }
}

impl From<Staff> for CanonicalRecord {
    fn from(s: Staff) -> Self {
        Self::Staff(s)
    }
}

impl From<Section> for CanonicalRecord {
    fn from(s: Section) -> Self {
        Self::Section(s)
    }
}

impl From<Enrollment> for CanonicalRecord {
    fn from(e: Enrollment) -> Self {
        Self::Enrollment(e)
    }
}
