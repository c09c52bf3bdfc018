//! Due-date and timestamp helpers shared by the board views, analytics and
//! the overdue digest.

use chrono::{Local, NaiveDate, NaiveDateTime};

use crate::errors::BoardError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Validate a due date supplied by a client. Empty input clears the date.
pub fn normalize_due_date(value: Option<&str>) -> Result<Option<String>, BoardError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_date(v)
            .map(|d| Some(d.format(DATE_FORMAT).to_string()))
            .ok_or_else(|| {
                BoardError::invalid(format!("Invalid due date '{}', expected YYYY-MM-DD", v))
            }),
    }
}

pub fn is_overdue(due_date: Option<&str>, today: NaiveDate) -> bool {
    due_date.and_then(parse_date).is_some_and(|d| d < today)
}

pub fn due_status(due_date: Option<&str>, today: NaiveDate) -> &'static str {
    let Some(due) = due_date.and_then(parse_date) else {
        return "";
    };
    let days = (due - today).num_days();
    if days < 0 {
        "(OVERDUE)"
    } else if days == 0 {
        "(TODAY)"
    } else if days <= 3 {
        "(SOON)"
    } else {
        ""
    }
}

pub fn due_class(due_date: Option<&str>, today: NaiveDate) -> &'static str {
    match due_date.and_then(parse_date) {
        None => "",
        Some(due) if due < today => "due-date-overdue",
        Some(due) if due == today => "due-date-today",
        Some(_) => "due-date-upcoming",
    }
}

/// Normalise a stored timestamp for display.
pub fn format_timestamp(value: &str) -> String {
    if value.is_empty() {
        return "-".to_string();
    }
    if value.len() == 10 {
        return value.to_string();
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return dt.format(TIMESTAMP_FORMAT).to_string();
        }
    }
    value.to_string()
}
