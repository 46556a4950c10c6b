//! Go-style duration strings as reported by LAPI (`"3h59m43.191505609s"`).
//!
//! The `duration` field on a decision is the *remaining* time and goes
//! negative once a decision has expired (`"-2m13.4s"`).

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static HOURS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\d.]+)h").unwrap());
// `m` followed by `s` is milliseconds, not minutes
static MINUTES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\d.]+)m(?:[^s]|$)").unwrap());
static SECONDS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\d.]+)s").unwrap());

fn component(re: &Regex, s: &str) -> f64 {
    re.captures(s)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Parse a duration string to whole milliseconds.
///
/// Each unit is extracted independently and summed; a missing or
/// unparsable unit contributes zero. A leading `-` negates the total.
pub fn parse_duration_ms(duration: &str) -> i64 {
    let trimmed = duration.trim();
    let sign = if trimmed.starts_with('-') { -1.0 } else { 1.0 };

    let ms = component(&HOURS_RE, trimmed) * 3_600_000.0
        + component(&MINUTES_RE, trimmed) * 60_000.0
        + component(&SECONDS_RE, trimmed) * 1_000.0;

    (sign * ms) as i64
}

/// Expiry for a decision: an explicit `until` wins, otherwise
/// `now + remaining duration` (which lands in the past for negative durations).
///
/// A duration too large to represent saturates: far-future ones at
/// `DateTime::<Utc>::MAX_UTC`, far-past ones at `now`.
pub fn compute_expires_at(
    until: Option<DateTime<Utc>>,
    duration: &str,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if let Some(until) = until {
        return until;
    }
    let ms = parse_duration_ms(duration);
    match Duration::try_milliseconds(ms).and_then(|d| now.checked_add_signed(d)) {
        Some(expires_at) => expires_at,
        None => {
            tracing::warn!(duration, ms, "decision duration out of range, clamping expiry");
            if ms > 0 { DateTime::<Utc>::MAX_UTC } else { now }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_duration() {
        let ms = parse_duration_ms("3h59m43.191505609s");
        assert!((ms - 14_383_191).abs() <= 1, "got {}", ms);
    }

    #[test]
    fn test_negative_duration() {
        assert_eq!(parse_duration_ms("-5m"), -300_000);
        assert_eq!(parse_duration_ms("-1h2m3s"), -3_723_000);
    }

    #[test]
    fn test_missing_units_contribute_zero() {
        assert_eq!(parse_duration_ms("45s"), 45_000);
        assert_eq!(parse_duration_ms("2h"), 7_200_000);
        assert_eq!(parse_duration_ms("1h0m0s"), 3_600_000);
        assert_eq!(parse_duration_ms(""), 0);
        assert_eq!(parse_duration_ms("garbage"), 0);
    }

    #[test]
    fn test_milliseconds_are_not_minutes() {
        assert_eq!(parse_duration_ms("150ms"), 0);
        assert_eq!(parse_duration_ms("1m30s"), 90_000);
    }

    #[test]
    fn test_unparsable_component_is_zero() {
        // "1.2.3" matches the pattern but isn't a number
        assert_eq!(parse_duration_ms("1.2.3h30s"), 30_000);
    }

    #[test]
    fn test_compute_expires_at_prefers_until() {
        let now = Utc::now();
        let until = now + Duration::days(2);
        assert_eq!(compute_expires_at(Some(until), "1h", now), until);
        assert_eq!(
            compute_expires_at(None, "1h", now),
            now + Duration::hours(1)
        );
        assert!(compute_expires_at(None, "-10m", now) < now);
    }

    #[test]
    fn test_out_of_range_duration_saturates() {
        let now = Utc::now();
        assert_eq!(
            compute_expires_at(None, "99999999999h", now),
            DateTime::<Utc>::MAX_UTC
        );
        assert_eq!(compute_expires_at(None, "-99999999999h", now), now);
    }
}
