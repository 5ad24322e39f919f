//! The consistency check is a report, never a repair: it lists cached states
//! that disagree with the ledger and leaves both sides untouched. The reset
//! tool is a blunt baseline, not a drift fix.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ddk_audit::NullAuditSink;
use ddk_reconcile::ReconcileEngine;
use ddk_schemas::{
    Actor, AttendanceRecord, DayStatus, Direction, EventSource, Person, Shift,
};
use ddk_store::{LedgerStore, MemoryStore, RosterStore};
use std::sync::Arc;
use uuid::Uuid;

fn ts(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, d, h, 0, 0).unwrap()
}

fn person(facility: Uuid, name: &str, state: Direction) -> Person {
    Person {
        person_id: Uuid::new_v4(),
        facility_id: facility,
        display_name: name.to_string(),
        unit: None,
        active: true,
        current_state: state,
        last_state_update: None,
    }
}

fn movement(p: &Person, d: u32, h: u32, direction: Direction) -> AttendanceRecord {
    AttendanceRecord {
        record_id: Uuid::new_v4(),
        person_id: p.person_id,
        facility_id: p.facility_id,
        day: NaiveDate::from_ymd_opt(2024, 11, d).unwrap(),
        direction,
        ts_utc: ts(d, h),
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

#[tokio::test]
async fn check_reports_mismatches_and_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let facility = Uuid::new_v4();

    // Consistent: cached IN, last record IN.
    let steady = person(facility, "steady", Direction::In);
    // Drifted: the OUT write reached the ledger but not the cache.
    let drifted = person(facility, "drifted", Direction::In);
    // No ledger history at all.
    let fresh = person(facility, "fresh", Direction::In);
    for p in [&steady, &drifted, &fresh] {
        store.upsert_person((*p).clone()).await.unwrap();
    }
    store.insert(movement(&steady, 4, 8, Direction::In)).await.unwrap();
    store.insert(movement(&drifted, 4, 8, Direction::In)).await.unwrap();
    store.insert(movement(&drifted, 4, 18, Direction::Out)).await.unwrap();

    let engine = ReconcileEngine::new(store.clone(), Arc::new(NullAuditSink));

    let report = engine.check_state_consistency(facility).await.unwrap();
    assert_eq!(report.len(), 1);
    let entry = &report[0];
    assert_eq!(entry.person_id, drifted.person_id);
    assert_eq!(entry.current_state, Direction::In);
    assert_eq!(entry.last_ledger_direction, Direction::Out);
    assert_eq!(entry.last_ledger_ts, ts(4, 18));

    // Nothing was repaired.
    let p = store.person(drifted.person_id).await.unwrap().unwrap();
    assert_eq!(p.current_state, Direction::In);
    let again = engine.check_state_consistency(facility).await.unwrap();
    assert_eq!(again.len(), 1, "report is repeatable");
}

#[tokio::test]
async fn reset_rebaselines_but_does_not_resolve_drift() {
    let store = Arc::new(MemoryStore::new());
    let facility = Uuid::new_v4();

    let mut outside = person(facility, "outside", Direction::Out);
    outside.current_state = Direction::Out;
    let inside = person(facility, "inside", Direction::In);
    store.upsert_person(outside.clone()).await.unwrap();
    store.upsert_person(inside.clone()).await.unwrap();
    // Ledger agrees with "outside" being out.
    store.insert(movement(&outside, 4, 18, Direction::Out)).await.unwrap();

    let engine = ReconcileEngine::new(store.clone(), Arc::new(NullAuditSink));
    assert!(engine.check_state_consistency(facility).await.unwrap().is_empty());

    let touched = engine
        .reset_all_states(facility, &Actor::admin("chief"))
        .await
        .unwrap();
    assert_eq!(touched, 2);

    let p = store.person(outside.person_id).await.unwrap().unwrap();
    assert_eq!(p.current_state, Direction::In, "reset forces IN");

    // The forced IN now disagrees with the ledger's OUT; the check says so.
    let report = engine.check_state_consistency(facility).await.unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].person_id, outside.person_id);
    assert_eq!(report[0].last_ledger_direction, Direction::Out);
}
