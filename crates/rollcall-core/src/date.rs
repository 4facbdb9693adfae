//! Calendar-day helpers.
//!
//! Days are carried around as `YYYY-MM-DD` strings because they double as
//! store field values and cache/usage key segments.

use time::{Date, OffsetDateTime, format_description::FormatItem, macros::format_description};

use crate::error::{CoreError, Result};

const DAY_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Parse a `YYYY-MM-DD` string into a calendar date.
pub fn parse_day(value: &str) -> Result<Date> {
    Date::parse(value, DAY_FORMAT).map_err(|_| CoreError::invalid_date(value))
}

/// Validate a `YYYY-MM-DD` string and return it in canonical form.
pub fn normalize_day(value: &str) -> Result<String> {
    let date = parse_day(value.trim())?;
    Ok(format_day(date))
}

pub fn format_day(date: Date) -> String {
    // Formatting a Date with a fixed description cannot fail for 4-digit years.
    date.format(DAY_FORMAT).unwrap_or_default()
}

/// Today's date (UTC) as `YYYY-MM-DD`.
pub fn today() -> String {
    format_day(OffsetDateTime::now_utc().date())
}
