//! Local date/time handling
//!
//! The store keeps UTC milliseconds. Callers read and write local wall-clock
//! time. Times of day have no native store type and travel as strings.

use chrono::{Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

static TIME_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):[0-5]\d:[0-5]\d(\.\d{1,9})?$").expect("valid time pattern")
});

const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// Convert a local wall-clock time to a store date
pub fn local_to_bson(value: &NaiveDateTime) -> bson::DateTime {
    let instant = match Local.from_local_datetime(value) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // skipped by a DST transition; keep the wall-clock digits
        LocalResult::None => Local.from_utc_datetime(value),
    };
    bson::DateTime::from_millis(instant.timestamp_millis())
}

/// Convert a local calendar date to a store date at local midnight
pub fn date_to_bson(value: &NaiveDate) -> bson::DateTime {
    local_to_bson(&value.and_time(NaiveTime::MIN))
}

/// Convert a store date to local wall-clock time
pub fn bson_to_local(value: &bson::DateTime) -> Option<NaiveDateTime> {
    Local
        .timestamp_millis_opt(value.timestamp_millis())
        .single()
        .map(|t| t.naive_local())
}

/// Convert a store timestamp (seconds since epoch) to local wall-clock time
pub fn timestamp_to_local(value: &bson::Timestamp) -> Option<NaiveDateTime> {
    Local
        .timestamp_opt(i64::from(value.time), 0)
        .single()
        .map(|t| t.naive_local())
}

/// Render a time of day in its stored form
pub fn time_to_string(value: &NaiveTime) -> String {
    value.format(TIME_FORMAT).to_string()
}

/// Parse a stored string as a time of day if it matches the time-literal pattern
pub fn parse_time_literal(value: &str) -> Option<NaiveTime> {
    if !TIME_LITERAL.is_match(value) {
        return None;
    }
    NaiveTime::parse_from_str(value, TIME_FORMAT).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_roundtrip() {
        let value = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_milli_opt(12, 30, 45, 250)
            .unwrap();
        let stored = local_to_bson(&value);
        assert_eq!(bson_to_local(&stored), Some(value));
    }

    #[test]
    fn test_date_is_stored_at_midnight() {
        let date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let back = bson_to_local(&date_to_bson(&date)).unwrap();
        assert_eq!(back.date(), date);
        assert_eq!(back.time(), NaiveTime::MIN);
    }

    #[test]
    fn test_time_literal_roundtrip() {
        let time = NaiveTime::from_hms_opt(8, 5, 9).unwrap();
        let text = time_to_string(&time);
        assert_eq!(text, "08:05:09");
        assert_eq!(parse_time_literal(&text), Some(time));

        let fractional = NaiveTime::from_hms_milli_opt(23, 59, 1, 500).unwrap();
        assert_eq!(parse_time_literal(&time_to_string(&fractional)), Some(fractional));
    }

    #[test]
    fn test_non_time_strings_are_left_alone() {
        assert_eq!(parse_time_literal("hello"), None);
        assert_eq!(parse_time_literal("24:00:00"), None);
        assert_eq!(parse_time_literal("12:00"), None);
        assert_eq!(parse_time_literal("2024-01-01 12:00:00"), None);
    }
}
