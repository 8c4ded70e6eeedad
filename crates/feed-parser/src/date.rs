//! Publication date parsing.
//!
//! Feeds in the wild mix RFC 2822 (RSS `pubDate`), RFC 3339 (Atom, `dc:date`)
//! and a handful of sloppier ISO-8601 variants without an offset. Values
//! without an offset are taken as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parse a feed date, returning `None` when no known format matches.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case("Mon, 02 Jan 2006 15:04:05 +0000", Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5))]
    #[case("Mon, 02 Jan 2006 15:04:05 GMT", Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5))]
    #[case("Mon, 02 Jan 2006 23:04:05 +0800", Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5))]
    #[case("2006-01-02T15:04:05Z", Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5))]
    #[case("2006-01-02T17:04:05+02:00", Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5))]
    #[case("2006-01-02T15:04:05", Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5))]
    #[case("2006-01-02 15:04:05", Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5))]
    #[case("  2006-01-02  ", Utc.with_ymd_and_hms(2006, 1, 2, 0, 0, 0))]
    fn test_parse_known_formats(
        #[case] raw: &str,
        #[case] expected: chrono::LocalResult<DateTime<Utc>>,
    ) {
        assert_eq!(parse_date(raw), expected.single());
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("yesterday")]
    #[case("2006-13-45")]
    fn test_parse_rejects_garbage(#[case] raw: &str) {
        assert_eq!(parse_date(raw), None);
    }
}
