//! A scan during approved leave fails with the leave details attached; the
//! same scan with an explicit override removes that day's generated record
//! and goes through.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ddk_audit::NullAuditSink;
use ddk_ingest::{EventInput, IngestEngine, IngestError};
use ddk_schemas::{
    AttendanceRecord, DayStatus, Direction, EventSource, LeaveApplication, LeaveStatus, Person,
    Shift,
};
use ddk_store::{LeaveStore, LedgerStore, MemoryStore, NullNotify, RosterStore};
use std::sync::Arc;
use uuid::Uuid;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, d).unwrap()
}

fn ts(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, d, h, m, 0).unwrap()
}

async fn setup() -> (Arc<MemoryStore>, IngestEngine, Person, LeaveApplication) {
    let store = Arc::new(MemoryStore::new());
    let person = Person {
        person_id: Uuid::new_v4(),
        facility_id: Uuid::new_v4(),
        display_name: "resident".to_string(),
        unit: None,
        active: true,
        current_state: Direction::Out,
        last_state_update: None,
    };
    store.upsert_person(person.clone()).await.unwrap();

    let leave = LeaveApplication {
        leave_id: Uuid::new_v4(),
        person_id: person.person_id,
        facility_id: person.facility_id,
        from_day: day(10),
        to_day: day(12),
        status: LeaveStatus::Approved,
        reason: "family".to_string(),
        requested_by: "warden".to_string(),
        decided_by: Some("chief".to_string()),
        decision_reason: None,
        early_return: false,
        actual_return_day: None,
        attendance_created: true,
        created_at: ts(9, 10, 0),
        updated_at: ts(9, 10, 0),
    };
    store.create(leave.clone()).await.unwrap();
    // The records approval generated, one per day of the range.
    for d in 10..=12 {
        store
            .insert(AttendanceRecord {
                record_id: Uuid::new_v4(),
                person_id: person.person_id,
                facility_id: person.facility_id,
                day: day(d),
                direction: Direction::Out,
                ts_utc: ts(d, 12, 0),
                source: EventSource::Leave,
                shift: Shift::Afternoon,
                status: DayStatus::OnLeave,
                reconciled: true,
                issues: vec![],
                note: None,
                reconciled_by: None,
                reconciled_at: None,
                deleted_by: None,
                deleted_at: None,
            })
            .await
            .unwrap();
    }

    let engine = IngestEngine::new(store.clone(), Arc::new(NullAuditSink), Arc::new(NullNotify));
    (store, engine, person, leave)
}

fn scan(person: &Person, at: DateTime<Utc>) -> EventInput {
    EventInput {
        person_id: person.person_id,
        facility_id: person.facility_id,
        ts_utc: at,
        direction: None,
        source: EventSource::Biometric,
        status: None,
        device_id: Some("gate-1".to_string()),
        note: None,
        override_leave_id: None,
        recorded_by: None,
    }
}

#[tokio::test]
async fn scan_inside_leave_window_conflicts_with_details() {
    let (store, engine, person, leave) = setup().await;

    let err = engine.ingest(scan(&person, ts(11, 9, 0))).await.unwrap_err();
    match err {
        IngestError::OnLeaveConflict { leave: got } => {
            assert_eq!(got.leave_id, leave.leave_id);
            assert_eq!(got.to_day, day(12));
        }
        other => panic!("expected on-leave conflict, got {other}"),
    }
    assert_eq!(store.live_record_count(), 3, "nothing written");

    // A scan after the window is a plain event.
    engine.ingest(scan(&person, ts(13, 9, 0))).await.unwrap();
    assert_eq!(store.live_record_count(), 4);
}

#[tokio::test]
async fn override_replaces_the_days_leave_record() {
    let (store, engine, person, leave) = setup().await;

    let mut event = scan(&person, ts(11, 9, 0));
    event.override_leave_id = Some(leave.leave_id);
    event.recorded_by = Some("warden".to_string());
    let outcome = engine.ingest(event).await.unwrap();

    assert_eq!(outcome.applied, Direction::In, "toggle ignores the deleted record");
    let records = store.day_records(person.person_id, day(11)).await.unwrap();
    assert_eq!(records.len(), 1, "leave record replaced, not joined");
    assert_eq!(records[0].source, EventSource::Biometric);
    assert_eq!(records[0].record_id, outcome.record.record_id);

    let p = store.person(person.person_id).await.unwrap().unwrap();
    assert_eq!(p.current_state, Direction::In);

    // Days the person did not scan on keep their leave records, and the
    // override never outlives its one event.
    for d in [10, 12] {
        let untouched = store.day_records(person.person_id, day(d)).await.unwrap();
        assert_eq!(untouched.len(), 1, "day {d}");
        assert_eq!(untouched[0].source, EventSource::Leave, "day {d}");
    }
    let err = engine.ingest(scan(&person, ts(12, 9, 0))).await.unwrap_err();
    assert!(matches!(err, IngestError::OnLeaveConflict { .. }));
}
