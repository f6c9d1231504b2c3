//! Timestamp helpers: clock-skew clamping, off-hours checks and
//! local-timezone rendering.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Clamp a timestamp that sits beyond `now + tolerance` back to `now`.
/// Events slightly in the future (adapter clock skew) pass through.
pub fn clamp_future(
    ts: DateTime<Utc>,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> DateTime<Utc> {
    if ts > now + tolerance {
        now
    } else {
        ts
    }
}

/// Off-hours: local time before 07:00 or after 19:00, or a weekend.
pub fn is_off_hours(ts: DateTime<Utc>, tz: &Tz) -> bool {
    let local = ts.with_timezone(tz);
    if local.weekday().number_from_monday() >= 6 {
        return true;
    }
    let t = local.time();
    let start = NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default();
    let end = NaiveTime::from_hms_opt(19, 0, 0).unwrap_or_default();
    t < start || t > end
}

/// Render a timestamp in the configured zone with its UTC offset.
pub fn render_local(ts: DateTime<Utc>, tz: &Tz) -> String {
    ts.with_timezone(tz).to_rfc3339()
}

/// Whole seconds between two instants, negative when `later < earlier`.
pub fn delta_seconds(later: DateTime<Utc>, earlier: DateTime<Utc>) -> i64 {
    (later - earlier).num_seconds()
}

/// Fractional hours between two instants, clamped at zero.
pub fn elapsed_hours(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    let seconds = (later - earlier).num_seconds();
    if seconds <= 0 {
        0.0
    } else {
        seconds as f64 / 3600.0
    }
}

/// Build a UTC timestamp for tests and fixtures.
pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_future() {
        let now = utc(2025, 1, 15, 12, 0, 0);
        let tol = Duration::minutes(5);

        let slightly_ahead = utc(2025, 1, 15, 12, 3, 0);
        assert_eq!(clamp_future(slightly_ahead, now, tol), slightly_ahead);

        let far_ahead = utc(2025, 1, 15, 12, 6, 0);
        assert_eq!(clamp_future(far_ahead, now, tol), now);

        let past = utc(2025, 1, 15, 11, 0, 0);
        assert_eq!(clamp_future(past, now, tol), past);
    }

    #[test]
    fn test_off_hours_weekday_bounds() {
        let tz: Tz = "UTC".parse().unwrap();
        // 2025-01-15 is a Wednesday.
        assert!(!is_off_hours(utc(2025, 1, 15, 7, 0, 0), &tz));
        assert!(!is_off_hours(utc(2025, 1, 15, 14, 23, 45), &tz));
        assert!(!is_off_hours(utc(2025, 1, 15, 19, 0, 0), &tz));
        assert!(is_off_hours(utc(2025, 1, 15, 6, 59, 59), &tz));
        assert!(is_off_hours(utc(2025, 1, 15, 19, 0, 1), &tz));
    }

    #[test]
    fn test_off_hours_weekend() {
        let tz: Tz = "UTC".parse().unwrap();
        // 2025-01-18 is a Saturday.
        assert!(is_off_hours(utc(2025, 1, 18, 12, 0, 0), &tz));
    }

    #[test]
    fn test_off_hours_respects_zone() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 23:00 UTC on a Wednesday is 18:00 in New York.
        assert!(!is_off_hours(utc(2025, 1, 15, 23, 0, 0), &tz));
        // 02:00 UTC Thursday is 21:00 Wednesday in New York.
        assert!(is_off_hours(utc(2025, 1, 16, 2, 0, 0), &tz));
    }

    #[test]
    fn test_render_local_offset() {
        let tz: Tz = "UTC".parse().unwrap();
        let rendered = render_local(utc(2025, 1, 15, 14, 23, 45), &tz);
        assert_eq!(rendered, "2025-01-15T14:23:45+00:00");
    }
}
