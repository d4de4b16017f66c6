//! Field-level normalization shared by the source and target mappers.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use roster_types::Role;

use crate::error::{MappingError, MappingResult};
use crate::raw::RawRecord;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$",
    )
    .expect("EMAIL_REGEX is a valid regex pattern")
});

static PUNCTUATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[[:punct:]\s]").expect("PUNCTUATION_REGEX is a valid regex pattern")
});

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Required, trimmed text field.
pub fn required(raw: &RawRecord, field: &str) -> MappingResult<String> {
    raw.text(field).ok_or_else(|| MappingError::missing(field))
}

/// Trimmed, uppercased code.
pub fn code(value: &str) -> String {
    value.trim().to_ascii_uppercase()
}

/// Optional email: trimmed, lowercased, and shape-checked.
pub fn email(raw: &RawRecord, field: &str) -> MappingResult<Option<String>> {
    let Some(value) = raw.text(field) else {
        return Ok(None);
    };
    let value = value.to_lowercase();
    if !EMAIL_REGEX.is_match(&value) {
        return Err(MappingError::invalid(field, value, "not an email address"));
    }
    Ok(Some(value))
}

/// Grade level. Kindergarten is 0 and pre-kindergarten is -1.
pub fn grade_level(raw: &RawRecord, field: &str) -> MappingResult<i32> {
    let value = required(raw, field)?;
    match value.to_ascii_uppercase().as_str() {
        "K" | "KG" => Ok(0),
        "PK" | "P" => Ok(-1),
        other => other
            .parse::<i32>()
            .map_err(|_| MappingError::unrecognized(field, value)),
    }
}

/// Role code or word, mapped onto the shared vocabulary.
pub fn role(raw: &RawRecord, field: &str) -> MappingResult<Role> {
    let value = required(raw, field)?;
    value
        .parse::<Role>()
        .map_err(|_| MappingError::unrecognized(field, value))
}

/// Optional calendar date. Accepts ISO and slash-separated dates, ISO
/// date-times, and RFC 2822 timestamps.
pub fn date(raw: &RawRecord, field: &str) -> MappingResult<Option<NaiveDate>> {
    let Some(value) = raw.text(field) else {
        return Ok(None);
    };
    parse_date(&value)
        .map(Some)
        .ok_or_else(|| MappingError::invalid(field, value, "unrecognized date format"))
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, format) {
            return Some(d);
        }
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Returns `true` if any of `fields` holds a date strictly before `as_of`.
pub fn ended_before(raw: &RawRecord, fields: &[&str], as_of: NaiveDate) -> MappingResult<bool> {
    for field in fields {
        if let Some(d) = date(raw, field)? {
            if d < as_of {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Returns `true` for status words that mean the record is not active.
pub fn is_inactive_status(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "archived" | "inactive" | "disabled" | "deleted"
    )
}

/// Platform login id: the first four letters of the last name followed by
/// the first four of the first name, lowercased, punctuation and whitespace
/// removed.
pub fn login_id(first_name: &str, last_name: &str) -> String {
    let mut id = strip_punctuation(last_name);
    id.push_str(&strip_punctuation(first_name));
    id
}

/// First four characters of `name` once lowercased and stripped.
fn strip_punctuation(name: &str) -> String {
    PUNCTUATION_REGEX
        .replace_all(&name.to_lowercase(), "")
        .chars()
        .take(4)
        .collect()
}
