use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// now_iso8601 returns the current UTC time as an RFC 3339 string with
/// microsecond precision, e.g. `2024-05-01T10:22:31.123456+00:00`.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// parse_timestamp parses an ISO-8601 timestamp into UTC.
///
/// Accepts RFC 3339 with an offset, a date-time without an offset and a bare
/// date. Values without an offset are read as UTC, a bare date as midnight.
pub fn parse_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc))
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(ts, format) {
            return Some(naive.and_utc())
        }
    }
    NaiveDate::parse_from_str(ts, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// offline_placeholder_id builds the identifier handed out for events that
/// were accepted while the store was offline and therefore never persisted.
pub fn offline_placeholder_id() -> String {
    format!("offline-{}", Utc::now().timestamp_millis())
}

/// object_id formats a 12-byte identifier (4 bytes of seconds, 8 bytes of
/// counter) as 24 lowercase hex characters.
pub fn object_id(seconds: u32, counter: u64) -> String {
    format!("{:08x}{:016x}", seconds, counter)
}

pub fn is_object_id(id: &str) -> bool {
    id.len() == 24 && id.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use crate::utils::utils::{is_object_id, now_iso8601, object_id, offline_placeholder_id, parse_timestamp};

    #[test]
    fn test_now_iso8601_round_trips() {
        let ts = now_iso8601();
        assert!(ts.ends_with("+00:00"));
        assert!(parse_timestamp(&ts).is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_parse_timestamp_without_offset() {
        let utc = parse_timestamp("2024-05-01T10:22:31.123456+00:00").unwrap();
        assert_eq!(parse_timestamp("2024-05-01T10:22:31.123456"), Some(utc));
        assert_eq!(parse_timestamp("2024-05-01 10:22:31.123456"), Some(utc));
        assert_eq!(
            parse_timestamp("2024-05-01T12:22:31+02:00"),
            parse_timestamp("2024-05-01T10:22:31"),
        );
        assert_eq!(parse_timestamp("2024-05-01"), parse_timestamp("2024-05-01T00:00:00Z"));
        assert!(parse_timestamp("2024-05-01T10:22").is_some());
        assert!(parse_timestamp("2024-13-01").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_object_id_format() {
        let id = object_id(0x6650_0000, 7);
        assert_eq!(id, "665000000000000000000007");
        assert!(is_object_id(&id));
        assert!(!is_object_id("not-an-id"));
        assert!(!is_object_id("66500000000000000000000g"));
    }

    #[test]
    fn test_offline_placeholder_id() {
        let id = offline_placeholder_id();
        assert!(id.starts_with("offline-"));
        assert!(id["offline-".len()..].parse::<i64>().is_ok());
    }
}
