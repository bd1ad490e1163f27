//! Five-field cron evaluation fixed to Indian Standard Time.
//!
//! `validate` and `next_after` share the same per-field matcher, so an
//! expression accepted by one is understood identically by the other. Cron
//! math is done entirely in IST wall-clock time and converted back to UTC
//! at the end, matching the fixed-timezone policy this scheduler is built
//! around — there is deliberately no generic timezone parameter.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

const IST: Tz = chrono_tz::Asia::Kolkata;

/// Upper bound on how far forward `next_after` scans before giving up and
/// falling back to a flat one-hour jump. 366 days of minutes comfortably
/// covers a leap year's worth of daily/monthly patterns.
const MAX_SCAN_MINUTES: i64 = 366 * 24 * 60;

/// Returns true if `expr` is a well-formed 5-field cron expression.
///
/// Accepted per-field grammar: `*`, a bare non-negative integer, `*/N`,
/// a comma-separated list of integers, or a single inclusive range `A-B`.
/// Anything else (`L`, `W`, `?`, a seconds field, extra/missing fields) is
/// rejected.
pub fn validate(expr: &str) -> bool {
    parse_fields(expr).is_some()
}

/// Computes the smallest UTC instant strictly after `after` at which `expr`
/// matches, expressed in IST wall-clock time. Seconds are always zero.
///
/// Falls back to `after + 1h` if the expression can't be parsed or no match
/// is found within the scan horizon; callers are expected to have already
/// validated the expression, so this path should only ever be hit for
/// malformed input that slipped through, and it always logs a warning.
pub fn next_after(expr: &str, after: DateTime<Utc>) -> DateTime<Utc> {
    let Some(fields) = parse_fields(expr) else {
        tracing::warn!(expr, "next_after: unparseable cron expression, falling back to +1h");
        return after + Duration::hours(1);
    };

    let ist_after = after.with_timezone(&IST);
    let mut candidate = ist_after
        .naive_local()
        .with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or_else(|| ist_after.naive_local())
        + Duration::minutes(1);

    let mut scanned = 0i64;
    while scanned < MAX_SCAN_MINUTES {
        if matches_naive(&fields, &candidate) {
            if let Some(result) = resolve_ist(candidate) {
                return result.with_timezone(&Utc);
            }
        }
        candidate += Duration::minutes(1);
        scanned += 1;
    }

    tracing::warn!(expr, "next_after: no match found within scan horizon, falling back to +1h");
    after + Duration::hours(1)
}

/// Resolves a naive IST wall-clock time to a concrete instant, skipping
/// datetimes IST itself has no representation for (it never happens, IST
/// has no DST, but `chrono_tz`'s API always returns a `LocalResult`).
fn resolve_ist(naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match IST.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => Some(dt),
        chrono::LocalResult::Ambiguous(dt, _) => Some(dt),
        chrono::LocalResult::None => None,
    }
}

#[derive(Debug, Clone)]
struct Fields {
    minute: Field,
    hour: Field,
    day: Field,
    month: Field,
    weekday: Field,
}

#[derive(Debug, Clone)]
enum Field {
    Any,
    Step(u32),
    Values(Vec<(u32, u32)>), // list of (lo, hi) inclusive, lo==hi for bare values
}

fn parse_fields(expr: &str) -> Option<Fields> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() != 5 {
        return None;
    }

    Some(Fields {
        minute: parse_field(parts[0], 0, 59)?,
        hour: parse_field(parts[1], 0, 23)?,
        day: parse_field(parts[2], 1, 31)?,
        month: parse_field(parts[3], 1, 12)?,
        weekday: parse_field(parts[4], 0, 6)?,
    })
}

fn parse_field(raw: &str, min: u32, max: u32) -> Option<Field> {
    if raw == "*" {
        return Some(Field::Any);
    }

    if let Some(step) = raw.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some(Field::Step(n));
    }

    let mut ranges = Vec::new();
    for part in raw.split(',') {
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo.parse().ok()?;
            let hi: u32 = hi.parse().ok()?;
            if lo > hi || lo < min || hi > max {
                return None;
            }
            ranges.push((lo, hi));
        } else {
            let v: u32 = part.parse().ok()?;
            if v < min || v > max {
                return None;
            }
            ranges.push((v, v));
        }
    }
    if ranges.is_empty() {
        None
    } else {
        Some(Field::Values(ranges))
    }
}

fn field_matches(field: &Field, value: u32) -> bool {
    match field {
        Field::Any => true,
        Field::Step(n) => value % n == 0,
        Field::Values(ranges) => ranges.iter().any(|(lo, hi)| value >= *lo && value <= *hi),
    }
}

fn matches_naive(fields: &Fields, dt: &NaiveDateTime) -> bool {
    field_matches(&fields.minute, dt.minute())
        && field_matches(&fields.hour, dt.hour())
        && field_matches(&fields.day, dt.day())
        && field_matches(&fields.month, dt.month())
        && field_matches(&fields.weekday, dt.weekday().num_days_from_sunday())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn every_minute_rejects_invalid_forms() {
        assert!(validate("* * * * *"));
        assert!(validate("*/5 * * * *"));
        assert!(validate("0 0 * * *"));
        assert!(validate("1-5 * * * *"));
        assert!(validate("0,30 * * * *"));
        assert!(!validate("* * * *"));
        assert!(!validate("L * * * *"));
        assert!(!validate("60 * * * *"));
    }

    #[test]
    fn every_minute_advances_exactly_one_minute() {
        let t0 = utc(2026, 1, 1, 10, 0);
        let t1 = next_after("* * * * *", t0);
        assert_eq!(t1, t0 + Duration::minutes(1));
    }

    #[test]
    fn next_after_never_returns_t0() {
        // IST midnight corresponds to 18:30 UTC the previous day.
        let t0 = utc(2026, 1, 1, 18, 30);
        let t1 = next_after("0 0 * * *", t0);
        assert!(t1 > t0);
    }

    #[test]
    fn step_field_matches_multiples() {
        let t0 = utc(2026, 1, 1, 10, 0);
        let t1 = next_after("*/15 * * * *", t0);
        // IST = UTC+5:30, so 10:00 UTC is 15:30 IST; next */15 boundary is 15:45 IST = 10:15 UTC.
        assert_eq!(t1, utc(2026, 1, 1, 10, 15));
    }

    #[test]
    fn daily_fixed_ist_time_crosses_to_next_day() {
        let t0 = utc(2026, 1, 1, 20, 0); // 01:30 IST on Jan 2
        let t1 = next_after("0 0 * * *", t0);
        assert_eq!(t1, utc(2026, 1, 2, 18, 30)); // 00:00 IST on Jan 3
    }

    #[test]
    fn idempotence_second_next_after_is_strictly_greater() {
        let t0 = utc(2026, 3, 3, 4, 0);
        let t1 = next_after("*/10 * * * *", t0);
        let t2 = next_after("*/10 * * * *", t1);
        assert!(t2 > t1);
    }
}
