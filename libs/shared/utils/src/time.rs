use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a client-supplied timestamp.
///
/// Accepts RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS` taken as UTC (the
/// format mobile clients send for ad-hoc appointment times).
pub fn parse_client_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
