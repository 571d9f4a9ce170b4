//! Accepted date shapes.
//!
//! - `M/D/YYYY`, falling back to `D/M/YYYY` (`/` or `-` separators)
//! - `YYYY-MM-DD`
//! - ISO-8601 timestamps containing `T` (RFC 3339, or naive to the minute/second)
//!
//! Calendar validity is checked through `chrono`, so `2024-02-30` and
//! `13/13/2024` are rejected while `02/29/2024` is accepted.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/-](\d{1,2})[/-](\d{4})$").unwrap());

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").unwrap());

const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse any accepted shape into a calendar date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    if let Some(caps) = NUMERIC_DATE.captures(value) {
        let first: u32 = caps[1].parse().ok()?;
        let second: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, first, second)
            .or_else(|| NaiveDate::from_ymd_opt(year, second, first));
    }

    if let Some(caps) = ISO_DATE.captures(value) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if value.contains('T') {
        return parse_timestamp(value);
    }

    None
}

fn parse_timestamp(value: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.date())
}

pub fn is_valid_date(value: &str) -> bool {
    parse_date(value).is_some()
}

/// Canonical `YYYY-MM-DD` form for export.
///
/// Values already shaped `YYYY-MM-DD` are returned untouched; values that
/// cannot be parsed come back as `None`.
pub fn normalize_date(value: &str) -> Option<String> {
    let value = value.trim();
    if ISO_DATE.is_match(value) {
        return Some(value.to_string());
    }
    parse_date(value).map(|d| d.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_dates() {
        assert!(is_valid_date("2024-02-29"));
        assert!(!is_valid_date("2024-02-30"));
        assert!(!is_valid_date("2023-02-29"));
        assert!(!is_valid_date("2024-13-01"));
        assert!(!is_valid_date("2024-1-01"));
    }

    #[test]
    fn test_numeric_dates() {
        assert!(is_valid_date("02/29/2024"));
        assert!(is_valid_date("2-9-2024"));
        // day-first fallback
        assert_eq!(parse_date("31/12/2024"), NaiveDate::from_ymd_opt(2024, 12, 31));
        // month-first preferred when both readings are valid
        assert_eq!(parse_date("03/04/2024"), NaiveDate::from_ymd_opt(2024, 3, 4));
        assert!(!is_valid_date("13/13/2024"));
        assert!(!is_valid_date("30/02/2024"));
        assert!(!is_valid_date("02/29/24"));
    }

    #[test]
    fn test_timestamps() {
        assert!(is_valid_date("2024-05-01T10:30:00Z"));
        assert!(is_valid_date("2024-05-01T10:30:00.123+02:00"));
        assert!(is_valid_date("2024-05-01T10:30"));
        assert!(!is_valid_date("2024-05-32T10:30:00Z"));
        assert!(!is_valid_date("Tomorrow"));
    }

    #[test]
    fn test_rejects_free_text() {
        assert!(!is_valid_date("May 1st 2024"));
        assert!(!is_valid_date(""));
        assert!(!is_valid_date("20240501"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_date("2/9/2024").as_deref(), Some("2024-02-09"));
        assert_eq!(normalize_date("25-12-2024").as_deref(), Some("2024-12-25"));
        assert_eq!(normalize_date("2024-05-01T23:30:00-05:00").as_deref(), Some("2024-05-01"));
        assert_eq!(normalize_date("2024-02-30").as_deref(), Some("2024-02-30"));
        assert_eq!(normalize_date("soon"), None);
    }
}
