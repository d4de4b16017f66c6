//! Mapping of SIS rows into canonical records.
//!
//! SIS rows use snake_case field names as produced by the PowerSchool
//! extraction query. Activity is spread over several fields; any one of
//! them saying "inactive" is enough.

use std::collections::BTreeSet;

use roster_types::{CanonicalRecord, EntityKind, Enrollment, Role, Section, Staff, Student};

use crate::context::MappingContext;
use crate::error::{MappingError, MappingResult};
use crate::normalize;
use crate::raw::RawRecord;

const END_DATE_FIELDS: [&str; 3] = ["exit_date", "last_day", "date_left"];

/// Map one SIS row of the given kind.
pub fn map_record(
    kind: EntityKind,
    raw: &RawRecord,
    ctx: &MappingContext,
) -> MappingResult<CanonicalRecord> {
    match kind {
        EntityKind::Staff => map_staff(raw, ctx).map(CanonicalRecord::Staff),
        EntityKind::Student => map_student(raw, ctx).map(CanonicalRecord::Student),
        EntityKind::Section => map_section(raw, ctx).map(CanonicalRecord::Section),
        EntityKind::Enrollment => map_enrollment(raw, ctx).map(CanonicalRecord::Enrollment),
    }
}

/// Best-effort identity of a row, used to report rows that fail to map.
pub fn identity_hint(kind: EntityKind, raw: &RawRecord) -> Option<String> {
    match kind {
        EntityKind::Staff => raw.first_text(&["teacher_id", "staff_id"]),
        EntityKind::Student => raw.first_text(&["eduid", "student_id"]),
        EntityKind::Section => raw.text("section_id"),
        EntityKind::Enrollment => {
            let member = raw.first_text(&MEMBER_FIELDS)?;
            let section = raw.text("section_id")?;
            Some(format!("{member}@{section}"))
        }
    }
}

const MEMBER_FIELDS: [&str; 4] = ["member_id", "eduid", "student_id", "teacher_id"];

fn explicitly_inactive(raw: &RawRecord, ctx: &MappingContext) -> MappingResult<bool> {
    if raw.flag("active") == Some(false) {
        return Ok(true);
    }
    normalize::ended_before(raw, &END_DATE_FIELDS, ctx.as_of)
}

fn map_student(raw: &RawRecord, ctx: &MappingContext) -> MappingResult<Student> {
    let id = raw
        .first_text(&["eduid", "student_id"])
        .ok_or_else(|| MappingError::missing("eduid"))?;
    let org_id = normalize::required(raw, "school_id")?;
    let first_name = normalize::required(raw, "first_name")?;
    let last_name = normalize::required(raw, "last_name")?;
    let login_id = raw
        .text("login_id")
        .unwrap_or_else(|| normalize::login_id(&first_name, &last_name));

    let enroll_status = raw.text("enroll_status");
    let withdrawn = matches!(enroll_status.as_deref(), Some(s) if s != "0");

    Ok(Student {
        id,
        org_id,
        middle_name: raw.text("middle_name"),
        email: normalize::email(raw, "email")?,
        grade_level: normalize::grade_level(raw, "grade_level")?,
        login_id,
        active: !(withdrawn || explicitly_inactive(raw, ctx)?),
        first_name,
        last_name,
    })
}

fn map_staff(raw: &RawRecord, ctx: &MappingContext) -> MappingResult<Staff> {
    let id = raw
        .first_text(&["teacher_id", "staff_id"])
        .ok_or_else(|| MappingError::missing("teacher_id"))?;
    let org_id = normalize::required(raw, "school_id")?;
    let first_name = normalize::required(raw, "first_name")?;
    let last_name = normalize::required(raw, "last_name")?;
    let login_id = raw
        .text("login_id")
        .unwrap_or_else(|| normalize::login_id(&first_name, &last_name));

    let role = if raw.contains("role") {
        normalize::role(raw, "role")?
    } else {
        Role::Teacher
    };
    if role.is_student() {
        return Err(MappingError::invalid(
            "role",
            role.code(),
            "student role on a staff record",
        ));
    }

    let status = raw.text("status");
    let disabled = matches!(status.as_deref(), Some(s) if s != "1");

    Ok(Staff {
        id,
        org_id,
        middle_name: raw.text("middle_name"),
        email: normalize::email(raw, "email")?,
        login_id,
        role,
        active: !(disabled || explicitly_inactive(raw, ctx)?),
        first_name,
        last_name,
    })
}

fn map_section(raw: &RawRecord, ctx: &MappingContext) -> MappingResult<Section> {
    let id = normalize::required(raw, "section_id")?;
    let org_id = normalize::required(raw, "school_id")?;
    let course_code = normalize::code(&normalize::required(raw, "course_number")?);

    let mut product_codes: BTreeSet<String> = ["product_code", "apex_program_code"]
        .iter()
        .flat_map(|f| raw.text_list(f))
        .map(|c| normalize::code(&c))
        .collect();
    if product_codes.is_empty() {
        if let Some(code) = ctx.default_product_code(&org_id) {
            product_codes.insert(normalize::code(code));
        }
    }
    if product_codes.is_empty() {
        return Err(MappingError::missing("product_code"));
    }

    let name = match (raw.text("course_name"), raw.text("section_number")) {
        (Some(course), Some(number)) => format!("{course} - {number}"),
        (Some(course), None) => course,
        _ => course_code.clone(),
    };

    Ok(Section {
        id,
        org_id,
        course_code,
        name,
        teacher_id: raw.text("teacher_id"),
        product_codes,
        start_date: normalize::date(raw, "first_day")?,
        active: !explicitly_inactive(raw, ctx)?,
    })
}

fn map_enrollment(raw: &RawRecord, ctx: &MappingContext) -> MappingResult<Enrollment> {
    let member_id = raw
        .first_text(&MEMBER_FIELDS)
        .ok_or_else(|| MappingError::missing("member_id"))?;
    let section_id = normalize::required(raw, "section_id")?;
    let role = if raw.contains("role") {
        normalize::role(raw, "role")?
    } else {
        Role::Student
    };
    let dropped = raw.flag("drop_flag").unwrap_or(false);

    Ok(Enrollment {
        member_id,
        section_id,
        role,
        active: !(dropped || explicitly_inactive(raw, ctx)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn ctx() -> MappingContext {
        MappingContext::new(NaiveDate::from_ymd_opt(2024, 9, 1).unwrap())
            .with_school("501", "z9065429")
    }

    fn student_row() -> RawRecord {
        RawRecord::new()
            .with("eduid", 1001)
            .with("school_id", 501)
            .with("first_name", " Ada ")
            .with("last_name", "Lovelace")
            .with("grade_level", 10)
            .with("email", "ADA@Example.org")
            .with("enroll_status", 0)
    }

    #[test]
    fn student_maps_and_derives_login() {
        let CanonicalRecord::Student(s) = map_record(EntityKind::Student, &student_row(), &ctx()).unwrap()
        else {
            panic!("expected a student");
        };
        assert_eq!(s.id, "1001");
        assert_eq!(s.org_id, "501");
        assert_eq!(s.first_name, "Ada");
        assert_eq!(s.email.as_deref(), Some("ada@example.org"));
        assert_eq!(s.login_id, "loveada");
        assert!(s.active);
    }

    #[test]
    fn student_inactive_representations() {
        let withdrawn = student_row().with("enroll_status", 2);
        let exited = student_row().with("exit_date", "2024-08-31");
        let flagged = student_row().with("active", false);
        let future_exit = student_row().with("exit_date", "2025-06-01");
        for (row, active) in [(withdrawn, false), (exited, false), (flagged, false), (future_exit, true)] {
            let r = map_record(EntityKind::Student, &row, &ctx()).unwrap();
            assert_eq!(r.is_active(), active);
        }
    }

    #[test]
    fn student_missing_id_is_rejected() {
        let row = RawRecord::new().with("first_name", "Ada");
        assert_eq!(
            map_record(EntityKind::Student, &row, &ctx()),
            Err(MappingError::MissingField("eduid".into()))
        );
    }

    #[test]
    fn staff_defaults_to_teacher_and_rejects_student_role() {
        let row = RawRecord::new()
            .with("teacher_id", "T1")
            .with("school_id", "501")
            .with("first_name", "Grace")
            .with("last_name", "Hopper")
            .with("status", 1);
        let CanonicalRecord::Staff(t) = map_record(EntityKind::Staff, &row, &ctx()).unwrap() else {
            panic!("expected staff");
        };
        assert_eq!(t.role, Role::Teacher);
        assert!(t.active);

        let disabled = row.clone().with("status", 2);
        assert!(!map_record(EntityKind::Staff, &disabled, &ctx()).unwrap().is_active());

        let wrong = row.with("role", "S");
        assert!(matches!(
            map_record(EntityKind::Staff, &wrong, &ctx()),
            Err(MappingError::InvalidValue { .. })
        ));
    }

    #[test]
    fn section_product_code_falls_back_to_school() {
        let row = RawRecord::new()
            .with("section_id", 77)
            .with("school_id", 501)
            .with("course_number", "eng101")
            .with("course_name", "English 9")
            .with("section_number", "2")
            .with("first_day", "2024-08-20");
        let CanonicalRecord::Section(s) = map_record(EntityKind::Section, &row, &ctx()).unwrap() else {
            panic!("expected a section");
        };
        assert_eq!(s.course_code, "ENG101");
        assert_eq!(s.name, "English 9 - 2");
        assert_eq!(s.product_codes.iter().collect::<Vec<_>>(), vec!["Z9065429"]);
        assert_eq!(s.start_date, NaiveDate::from_ymd_opt(2024, 8, 20));

        let explicit = row.clone().with("apex_program_code", json!(["z1", "z2"]));
        let CanonicalRecord::Section(s) = map_record(EntityKind::Section, &explicit, &ctx()).unwrap()
        else {
            panic!("expected a section");
        };
        assert_eq!(s.product_codes.len(), 2);

        let unknown_school = row.with("school_id", 999);
        assert_eq!(
            map_record(EntityKind::Section, &unknown_school, &ctx()),
            Err(MappingError::MissingField("product_code".into()))
        );
    }

    #[test]
    fn enrollment_role_and_drop() {
        let row = RawRecord::new().with("eduid", 1001).with("section_id", 77);
        let CanonicalRecord::Enrollment(e) = map_record(EntityKind::Enrollment, &row, &ctx()).unwrap()
        else {
            panic!("expected an enrollment");
        };
        assert_eq!(e.role, Role::Student);
        assert_eq!(e.member_id, "1001");
        assert!(e.active);

        let dropped = row.clone().with("drop_flag", 1);
        assert!(!map_record(EntityKind::Enrollment, &dropped, &ctx()).unwrap().is_active());

        let bad_role = row.with("role", "janitor");
        assert!(matches!(
            map_record(EntityKind::Enrollment, &bad_role, &ctx()),
            Err(MappingError::UnrecognizedValue { .. })
        ));
    }

    #[test]
    fn identity_hints() {
        assert_eq!(identity_hint(EntityKind::Student, &student_row()).as_deref(), Some("1001"));
        let row = RawRecord::new().with("teacher_id", "T1").with("section_id", 7);
        assert_eq!(identity_hint(EntityKind::Enrollment, &row).as_deref(), Some("T1@7"));
    }
}
