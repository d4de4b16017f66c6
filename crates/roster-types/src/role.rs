use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Shared role vocabulary.
///
/// The SIS spells roles out (`student`, `teacher`) while the learning
/// platform uses short codes (`S`, `T`, `M`, `TC`, `SC`). Both map here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Mentor,
    TechnicalCoordinator,
    SiteCoordinator,
}

impl Role {
    /// The learning platform's short code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Student => "S",
            Self::Teacher => "T",
            Self::Mentor => "M",
            Self::TechnicalCoordinator => "TC",
            Self::SiteCoordinator => "SC",
        }
    }

    /// Returns `true` if holders of this role are Student records.
    pub fn is_student(&self) -> bool {
        matches!(self, Self::Student)
    }

    /// Returns `true` if holders of this role are Staff records.
    pub fn is_staff(&self) -> bool {
        !self.is_student()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Role {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "student" => Ok(Self::Student),
            "t" | "teacher" => Ok(Self::Teacher),
            "m" | "mentor" => Ok(Self::Mentor),
            "tc" | "technical_coordinator" | "technical coordinator" => {
                Ok(Self::TechnicalCoordinator)
            }
            "sc" | "site_coordinator" | "site coordinator" => Ok(Self::SiteCoordinator),
            _ => Err(TypeError::UnrecognizedRole(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_codes_and_words() {
        assert_eq!("S".parse::<Role>().unwrap(), Role::Student);
        assert_eq!(" teacher ".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!("tc".parse::<Role>().unwrap(), Role::TechnicalCoordinator);
        assert_eq!("Site Coordinator".parse::<Role>().unwrap(), Role::SiteCoordinator);
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert_eq!(
            "principal".parse::<Role>(),
            Err(TypeError::UnrecognizedRole("principal".into()))
        );
    }

    #[test]
    fn code_roundtrips_through_parse() {
        for role in [
            Role::Student,
            Role::Teacher,
            Role::Mentor,
            Role::TechnicalCoordinator,
            Role::SiteCoordinator,
        ] {
            assert_eq!(role.code().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn student_vs_staff() {
        assert!(Role::Student.is_student());
        assert!(Role::Mentor.is_staff());
    }
}
