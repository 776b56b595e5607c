use chrono::{DateTime, SecondsFormat, Utc};

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// RFC 3339 with second precision and a `Z` suffix, as sent in webhook headers.
pub fn to_rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Delay before the next re-delivery after `attempts` deliveries: 30s doubling
/// per attempt, capped at one hour.
pub fn retry_backoff(attempts: usize) -> chrono::Duration {
    let exp = attempts.saturating_sub(1).min(16) as u32;
    let secs = (30i64 * 2i64.pow(exp)).min(3600);
    chrono::Duration::seconds(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(0).num_seconds(), 30);
        assert_eq!(retry_backoff(1).num_seconds(), 30);
        assert_eq!(retry_backoff(2).num_seconds(), 60);
        assert_eq!(retry_backoff(4).num_seconds(), 240);
        assert_eq!(retry_backoff(10).num_seconds(), 3600);
    }

    #[test]
    fn rfc3339_roundtrip() {
        let ts = to_rfc3339(now());
        assert!(ts.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
