//! Validates a realistic day of scans one event at a time, the way the
//! ingest pipeline does: each event is checked against the records already
//! written, then appended.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ddk_schemas::{
    AttendanceRecord, DayStatus, Direction, EventSource, FacilityPolicy, IssueKind, Severity,
    Shift,
};
use ddk_validate::{auto_reconciled, validate, ValidatorConfig};
use uuid::Uuid;

fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 11, h, m, s).unwrap()
}

fn record(direction: Direction, at: DateTime<Utc>) -> AttendanceRecord {
    AttendanceRecord {
        record_id: Uuid::new_v4(),
        person_id: Uuid::new_v4(),
        facility_id: Uuid::new_v4(),
        day: NaiveDate::from_ymd_opt(2024, 3, 11).unwrap(),
        direction,
        ts_utc: at,
        source: EventSource::Biometric,
        shift: Shift::Morning,
        status: DayStatus::Present,
        reconciled: true,
        issues: vec![],
        note: None,
        reconciled_by: None,
        reconciled_at: None,
        deleted_by: None,
        deleted_at: None,
    }
}

#[test]
fn normal_day_accumulates_no_flags() {
    let cfg = ValidatorConfig::default();
    let pol = FacilityPolicy::defaults(Uuid::new_v4());

    let events = [
        (Direction::In, ts(7, 55, 0)),
        (Direction::Out, ts(8, 40, 0)),
        (Direction::In, ts(13, 10, 0)),
        (Direction::Out, ts(18, 5, 0)),
        (Direction::In, ts(21, 30, 0)),
    ];

    let mut ledger: Vec<AttendanceRecord> = Vec::new();
    for (direction, at) in events {
        let issues = validate(&cfg, &pol, direction, at, &ledger);
        assert!(issues.is_empty(), "unexpected flags at {at}: {issues:?}");
        ledger.push(record(direction, at));
    }
}

#[test]
fn double_badge_then_forgotten_out_flags_in_sequence() {
    let cfg = ValidatorConfig::default();
    let pol = FacilityPolicy::defaults(Uuid::new_v4());
    let mut ledger: Vec<AttendanceRecord> = Vec::new();

    // 08:00 IN — clean.
    let issues = validate(&cfg, &pol, Direction::In, ts(8, 0, 0), &ledger);
    assert!(issues.is_empty());
    ledger.push(record(Direction::In, ts(8, 0, 0)));

    // 08:00:30 IN — the person badged twice at the reader.
    let issues = validate(&cfg, &pol, Direction::In, ts(8, 0, 30), &ledger);
    assert_eq!(issues.len(), 1, "exactly one flag expected: {issues:?}");
    assert_eq!(issues[0].kind, IssueKind::Duplicate);
    assert_eq!(issues[0].severity, Severity::Warning);
    assert!(auto_reconciled(&issues), "a duplicate alone stays reconciled");
    ledger.push(record(Direction::In, ts(8, 0, 30)));

    // 14:00 IN — never badged out; this one needs an operator.
    let issues = validate(&cfg, &pol, Direction::In, ts(14, 0, 0), &ledger);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::MissingOut);
    assert_eq!(issues[0].severity, Severity::Error);
    assert!(!auto_reconciled(&issues));
    ledger.push(record(Direction::In, ts(14, 0, 0)));

    // 14:02 OUT — resolves the direction but trips the short-stay window.
    let issues = validate(&cfg, &pol, Direction::Out, ts(14, 2, 0), &ledger);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::ShortStay);
    assert_eq!(issues[0].severity, Severity::Warning);
}

#[test]
fn advisories_never_turn_into_errors() {
    // A busy day in night hours: duplicate + excessive + unusual time are all
    // advisory; auto_reconciled stays true throughout.
    let cfg = ValidatorConfig::default();
    let pol = FacilityPolicy::defaults(Uuid::new_v4());

    let mut ledger: Vec<AttendanceRecord> = Vec::new();
    let mut direction = Direction::In;
    for i in 0..12 {
        ledger.push(record(direction, ts(23, 0, i * 4)));
        direction = direction.toggled();
    }

    let issues = validate(&cfg, &pol, direction, ts(23, 1, 0), &ledger);
    let severities: Vec<Severity> = issues.iter().map(|i| i.severity).collect();
    assert!(!issues.is_empty());
    assert!(severities.iter().all(|s| *s != Severity::Error));
    assert!(auto_reconciled(&issues));
}
