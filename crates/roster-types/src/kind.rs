use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The kinds of entity reconciled between the two systems.
///
/// The derived ordering is the fixed precedence used when sequencing
/// creates and updates: people and sections before the enrollments that
/// reference them. Deactivations run in the reverse order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Staff,
    Student,
    Section,
    Enrollment,
}

impl EntityKind {
    /// All kinds in precedence order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Staff,
        EntityKind::Student,
        EntityKind::Section,
        EntityKind::Enrollment,
    ];

    /// Stable lowercase name, used in config files, logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Staff => "staff",
            Self::Student => "student",
            Self::Section => "section",
            Self::Enrollment => "enrollment",
        }
    }

    /// Kinds this kind's records reference (and therefore depend on).
    pub fn dependencies(&self) -> &'static [EntityKind] {
        match self {
            Self::Section => &[EntityKind::Staff],
            Self::Enrollment => &[EntityKind::Staff, EntityKind::Student, EntityKind::Section],
            Self::Staff | Self::Student => &[],
        }
    }

    /// Returns `true` for kinds that other records reference.
    pub fn is_parent(&self) -> bool {
        !matches!(self, Self::Enrollment)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staff" => Ok(Self::Staff),
            "student" | "students" => Ok(Self::Student),
            "section" | "sections" | "classroom" | "classrooms" => Ok(Self::Section),
            "enrollment" | "enrollments" => Ok(Self::Enrollment),
            _ => Err(TypeError::UnknownKind(s.to_string())),
        }
    }
}
