//! Mapping between learning-platform objects and canonical records.
//!
//! Platform objects use PascalCase field names. [`to_raw`] is the inverse of
//! [`map_record`] and is what gateways send as request bodies.

use std::collections::BTreeSet;

use roster_types::{CanonicalRecord, EntityKind, Enrollment, Role, Section, Staff, Student};
use serde_json::Value;

use crate::context::MappingContext;
use crate::error::{MappingError, MappingResult};
use crate::normalize;
use crate::raw::RawRecord;

const STATUS_FIELDS: [&str; 2] = ["RoleStatus", "Status"];
const ACTIVE: &str = "Active";
const ARCHIVED: &str = "Archived";

/// Map one platform object of the given kind.
pub fn map_record(
    kind: EntityKind,
    raw: &RawRecord,
    ctx: &MappingContext,
) -> MappingResult<CanonicalRecord> {
    match kind {
        EntityKind::Staff => map_staff(raw).map(CanonicalRecord::Staff),
        EntityKind::Student => map_student(raw).map(CanonicalRecord::Student),
        EntityKind::Section => map_section(raw, ctx).map(CanonicalRecord::Section),
        EntityKind::Enrollment => map_enrollment(raw).map(CanonicalRecord::Enrollment),
    }
}

/// Best-effort identity of an object, used to report objects that fail to map.
pub fn identity_hint(kind: EntityKind, raw: &RawRecord) -> Option<String> {
    match kind {
        EntityKind::Staff | EntityKind::Student => raw.text("ImportUserId"),
        EntityKind::Section => raw.text("ImportClassroomId"),
        EntityKind::Enrollment => {
            let member = raw.text("ImportUserId")?;
            let section = raw.text("ImportClassroomId")?;
            Some(format!("{member}@{section}"))
        }
    }
}

/// Render a canonical record as a platform object.
pub fn to_raw(record: &CanonicalRecord) -> RawRecord {
    match record {
        CanonicalRecord::Student(s) => person(&s.id, &s.org_id, &s.first_name, &s.middle_name, &s.last_name)
            .with("Email", opt(&s.email))
            .with("GradeLevel", s.grade_level)
            .with("LoginId", s.login_id.as_str())
            .with("Role", Role::Student.code())
            .with("RoleStatus", status(s.active)),
        CanonicalRecord::Staff(t) => person(&t.id, &t.org_id, &t.first_name, &t.middle_name, &t.last_name)
            .with("Email", opt(&t.email))
            .with("LoginId", t.login_id.as_str())
            .with("Role", t.role.code())
            .with("RoleStatus", status(t.active)),
        CanonicalRecord::Section(c) => RawRecord::new()
            .with("ImportClassroomId", c.id.as_str())
            .with("ImportOrgId", c.org_id.as_str())
            .with("CourseCode", c.course_code.as_str())
            .with("ClassroomName", c.name.as_str())
            .with("ImportUserId", opt(&c.teacher_id))
            .with(
                "ProductCodes",
                c.product_codes.iter().cloned().map(Value::from).collect::<Vec<_>>(),
            )
            .with(
                "ClassroomStartDate",
                c.start_date
                    .map(|d| Value::from(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(Value::Null),
            )
            .with("Status", status(c.active)),
        CanonicalRecord::Enrollment(e) => RawRecord::new()
            .with("ImportUserId", e.member_id.as_str())
            .with("ImportClassroomId", e.section_id.as_str())
            .with("Role", e.role.code())
            .with("RoleStatus", status(e.active)),
    }
}

fn person(id: &str, org: &str, first: &str, middle: &Option<String>, last: &str) -> RawRecord {
    RawRecord::new()
        .with("ImportUserId", id)
        .with("ImportOrgId", org)
        .with("FirstName", first)
        .with("MiddleName", opt(middle))
        .with("LastName", last)
}

fn opt(value: &Option<String>) -> Value {
    value.as_deref().map(Value::from).unwrap_or(Value::Null)
}

fn status(active: bool) -> &'static str {
    if active {
        ACTIVE
    } else {
        ARCHIVED
    }
}

fn is_active(raw: &RawRecord) -> bool {
    if raw.flag("Active") == Some(false) {
        return false;
    }
    !raw
        .first_text(&STATUS_FIELDS)
        .is_some_and(|s| normalize::is_inactive_status(&s))
}

fn map_student(raw: &RawRecord) -> MappingResult<Student> {
    let id = normalize::required(raw, "ImportUserId")?;
    let org_id = normalize::required(raw, "ImportOrgId")?;
    let first_name = normalize::required(raw, "FirstName")?;
    let last_name = normalize::required(raw, "LastName")?;
    if raw.contains("Role") {
        let role = normalize::role(raw, "Role")?;
        if !role.is_student() {
            return Err(MappingError::invalid(
                "Role",
                role.code(),
                "staff role on a student object",
            ));
        }
    }
    let login_id = raw
        .text("LoginId")
        .unwrap_or_else(|| normalize::login_id(&first_name, &last_name));

    Ok(Student {
        id,
        org_id,
        middle_name: raw.text("MiddleName"),
        email: normalize::email(raw, "Email")?,
        grade_level: normalize::grade_level(raw, "GradeLevel")?,
        login_id,
        active: is_active(raw),
        first_name,
        last_name,
    })
}

fn map_staff(raw: &RawRecord) -> MappingResult<Staff> {
    let id = normalize::required(raw, "ImportUserId")?;
    let org_id = normalize::required(raw, "ImportOrgId")?;
    let first_name = normalize::required(raw, "FirstName")?;
    let last_name = normalize::required(raw, "LastName")?;
    let role = if raw.contains("Role") {
        normalize::role(raw, "Role")?
    } else {
        Role::Teacher
    };
    if role.is_student() {
        return Err(MappingError::invalid(
            "Role",
            role.code(),
            "student role on a staff object",
        ));
    }
    let login_id = raw
        .text("LoginId")
        .unwrap_or_else(|| normalize::login_id(&first_name, &last_name));

    Ok(Staff {
        id,
        org_id,
        middle_name: raw.text("MiddleName"),
        email: normalize::email(raw, "Email")?,
        login_id,
        role,
        active: is_active(raw),
        first_name,
        last_name,
    })
}

fn map_section(raw: &RawRecord, ctx: &MappingContext) -> MappingResult<Section> {
    let id = normalize::required(raw, "ImportClassroomId")?;
    let org_id = normalize::required(raw, "ImportOrgId")?;
    let course_code = normalize::code(&normalize::required(raw, "CourseCode")?);
    let name = raw.text("ClassroomName").unwrap_or_else(|| course_code.clone());
    let product_codes: BTreeSet<String> = raw
        .text_list("ProductCodes")
        .iter()
        .map(|c| normalize::code(c))
        .collect();
    let ended = normalize::ended_before(raw, &["ClassroomEndDate"], ctx.as_of)?;

    Ok(Section {
        id,
        org_id,
        course_code,
        name,
        teacher_id: raw.text("ImportUserId"),
        product_codes,
        start_date: normalize::date(raw, "ClassroomStartDate")?,
        active: is_active(raw) && !ended,
    })
}

fn map_enrollment(raw: &RawRecord) -> MappingResult<Enrollment> {
    Ok(Enrollment {
        member_id: normalize::required(raw, "ImportUserId")?,
        section_id: normalize::required(raw, "ImportClassroomId")?,
        role: normalize::role(raw, "Role")?,
        active: is_active(raw),
    })
}
