use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Deadlines travel as `YYYY-MM-DD`; the backend normalizes them.
pub fn to_date_only(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Accepts RFC 3339, naive ISO datetimes (taken as UTC) and bare dates.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    Err(Error::Validation(format!("Unrecognized timestamp: {}", s)))
}

pub fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

pub fn deserialize_timestamp_opt<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(s) if !s.trim().is_empty() => parse_timestamp(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_all_backend_timestamp_shapes() {
        let a = parse_timestamp("2025-03-01T10:30:00Z").unwrap();
        let b = parse_timestamp("2025-03-01T10:30:00").unwrap();
        let c = parse_timestamp("2025-03-01T10:30:00.123456").unwrap();
        assert_eq!(a, b);
        assert_eq!(c.hour(), 10);
        let d = parse_timestamp("2025-03-01").unwrap();
        assert_eq!((d.year(), d.month(), d.day(), d.hour()), (2025, 3, 1, 0));
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn date_only_format() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        assert_eq!(to_date_only(date), "2025-01-09");
    }
}
