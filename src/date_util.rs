use chrono::{DateTime, Utc};

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parse an RFC 1123 HTTP-date (`Wed, 21 Oct 2015 07:28:00 GMT`).
pub fn parse_http_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(s.trim())
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Milliseconds from `now` until `target`; negative when `target` has passed.
pub fn millis_until(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (target - now).num_milliseconds()
}

/// Timestamp used in report footers and log lines (`dd/mm/yyyy HH:MM:SS`).
pub fn display_timestamp(d: DateTime<chrono::Local>) -> String {
    d.format("%d/%m/%Y %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_parse_http_date() {
        let parsed = parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap());
    }

    #[test]
    fn test_parse_http_date_invalid() {
        assert!(parse_http_date("soon").is_none());
        assert!(parse_http_date("").is_none());
        assert!(parse_http_date("120").is_none());
    }

    #[test]
    fn test_millis_until() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(millis_until(now + Duration::seconds(3), now), 3000);
        assert_eq!(millis_until(now - Duration::seconds(1), now), -1000);
    }

    #[test]
    fn test_display_timestamp() {
        let d = chrono::Local.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(display_timestamp(d), "07/03/2025 09:05:01");
    }
}
