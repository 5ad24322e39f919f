//! Facility-local time helpers.
//!
//! Every calendar decision in the system (which day an event belongs to,
//! which shift it falls in, when a timer fires) is taken in the facility's
//! IANA timezone, never in UTC. These helpers are the only place the
//! UTC↔local conversion rules live.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Calendar date an instant falls on in the facility's timezone.
pub fn local_day(ts: DateTime<Utc>, tz: Tz) -> NaiveDate {
    ts.with_timezone(&tz).date_naive()
}

/// Hour-of-day [0,24) of an instant in the facility's timezone.
pub fn local_hour(ts: DateTime<Utc>, tz: Tz) -> u32 {
    use chrono::Timelike;
    ts.with_timezone(&tz).hour()
}

/// UTC instant of a facility-local wall-clock time on a given day.
///
/// DST edge rules: an ambiguous wall-clock time (fold) resolves to the
/// earliest instant; a non-existent one (gap) resolves to the first valid
/// instant after the jump.
pub fn local_time_utc(day: NaiveDate, at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let naive = day.and_time(at);
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Gap: real-world DST jumps are at most one hour.
    let shifted = naive + Duration::hours(1);
    match tz.from_local_datetime(&shifted).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&naive),
    }
}

/// UTC instant of facility-local noon — the synthesized timestamp for bulk
/// rows and leave-sourced records, safely inside any day regardless of DST.
pub fn local_noon_utc(day: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
    local_time_utc(day, noon, tz)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::{America::New_York, Asia::Dhaka, UTC};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn local_day_crosses_midnight_before_utc() {
        // 19:30 UTC on Jan 5 is already 01:30 Jan 6 in Dhaka (UTC+6).
        let ts = Utc.with_ymd_and_hms(2024, 1, 5, 19, 30, 0).unwrap();
        assert_eq!(local_day(ts, Dhaka), d(2024, 1, 6));
        assert_eq!(local_day(ts, UTC), d(2024, 1, 5));
    }

    #[test]
    fn local_hour_follows_offset() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 5, 3, 0, 0).unwrap();
        assert_eq!(local_hour(ts, Dhaka), 9);
        assert_eq!(local_hour(ts, UTC), 3);
    }

    #[test]
    fn noon_in_dhaka_is_six_utc() {
        let ts = local_noon_utc(d(2024, 1, 10), Dhaka);
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 10, 6, 0, 0).unwrap());
    }

    #[test]
    fn dst_gap_resolves_to_first_valid_instant() {
        // US spring-forward 2024-03-10: 02:30 EST does not exist.
        let ts = local_time_utc(d(2024, 3, 10), t(2, 30), New_York);
        // 03:30 EDT == 07:30 UTC.
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 10, 7, 30, 0).unwrap());
    }

    #[test]
    fn dst_fold_resolves_to_earliest() {
        // US fall-back 2024-11-03: 01:30 occurs twice; earliest is EDT (UTC-4).
        let ts = local_time_utc(d(2024, 11, 3), t(1, 30), New_York);
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap());
    }
}
