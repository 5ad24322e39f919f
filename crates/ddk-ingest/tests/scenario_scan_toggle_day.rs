//! A day of type-omitted device scans: directions toggle off the ledger,
//! the cached person state follows each write, and the first-entry policy
//! gates explicit OUT entries.

use chrono::{DateTime, TimeZone, Utc};
use ddk_audit::NullAuditSink;
use ddk_ingest::{EventInput, IngestEngine, IngestError};
use ddk_schemas::{DayStatus, Direction, EventNotice, EventSource, FacilityPolicy, Person};
use ddk_store::{MemoryStore, NotifySink, RosterStore, SettingsStore};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct CaptureNotify {
    notices: Mutex<Vec<EventNotice>>,
}

impl NotifySink for CaptureNotify {
    fn notify(&self, notice: &EventNotice) {
        self.notices.lock().unwrap().push(notice.clone());
    }
}

fn ts(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, h, m, 0).unwrap()
}

fn scan(person_id: Uuid, facility_id: Uuid, at: DateTime<Utc>) -> EventInput {
    EventInput {
        person_id,
        facility_id,
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

async fn setup() -> (Arc<MemoryStore>, Arc<CaptureNotify>, IngestEngine, Person) {
    let store = Arc::new(MemoryStore::new());
    let notify = Arc::new(CaptureNotify::default());
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
    let engine = IngestEngine::new(store.clone(), Arc::new(NullAuditSink), notify.clone());
    (store, notify, engine, person)
}

#[tokio::test]
async fn omitted_direction_toggles_off_the_ledger() {
    let (store, notify, engine, person) = setup().await;

    let expected = [
        (Direction::In, DayStatus::Present),
        (Direction::Out, DayStatus::LeftEarly),
        (Direction::In, DayStatus::Present),
        (Direction::Out, DayStatus::LeftEarly),
    ];
    let times = [ts(7, 58), ts(12, 2), ts(13, 1), ts(18, 30)];

    for (i, at) in times.into_iter().enumerate() {
        let outcome = engine
            .ingest(scan(person.person_id, person.facility_id, at))
            .await
            .unwrap();
        assert_eq!(outcome.applied, expected[i].0, "event {i}");
        assert_eq!(outcome.record.status, expected[i].1, "event {i}");
        assert!(outcome.issues.is_empty(), "event {i}: {:?}", outcome.issues);
        assert!(outcome.record.reconciled);

        let p = store.person(person.person_id).await.unwrap().unwrap();
        assert_eq!(p.current_state, expected[i].0);
        assert_eq!(p.last_state_update, Some(at));
    }

    assert_eq!(store.live_record_count(), 4);
    assert_eq!(notify.notices.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn first_entry_policy_rejects_explicit_out_on_fresh_day() {
    let (store, _notify, engine, person) = setup().await;
    let mut policy = FacilityPolicy::defaults(person.facility_id);
    policy.first_entry_must_be_in = true;
    store.put_policy(policy).await.unwrap();

    let mut event = scan(person.person_id, person.facility_id, ts(8, 0));
    event.direction = Some(Direction::Out);
    event.source = EventSource::Manual;
    let err = engine.ingest(event).await.unwrap_err();
    assert!(matches!(err, IngestError::ValidationFailure(_)));
    assert_eq!(store.live_record_count(), 0);

    // Once a record exists the gate is open.
    engine
        .ingest(scan(person.person_id, person.facility_id, ts(8, 5)))
        .await
        .unwrap();
    let mut event = scan(person.person_id, person.facility_id, ts(17, 0));
    event.direction = Some(Direction::Out);
    event.source = EventSource::Manual;
    engine.ingest(event).await.unwrap();
    assert_eq!(store.live_record_count(), 2);
}

#[tokio::test]
async fn unknown_inactive_and_misrouted_people_are_rejected() {
    let (store, notify, engine, person) = setup().await;

    let err = engine
        .ingest(scan(Uuid::new_v4(), person.facility_id, ts(8, 0)))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::NotFound(_)));

    let mut gone = person.clone();
    gone.active = false;
    store.upsert_person(gone).await.unwrap();
    let err = engine
        .ingest(scan(person.person_id, person.facility_id, ts(8, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::NotFound(_)));

    let mut back = person.clone();
    back.active = true;
    store.upsert_person(back).await.unwrap();
    let err = engine
        .ingest(scan(person.person_id, Uuid::new_v4(), ts(8, 2)))
        .await
        .unwrap_err();
    match err {
        IngestError::WrongFacility { facility_id, .. } => {
            assert_eq!(facility_id, person.facility_id)
        }
        other => panic!("expected wrong-facility, got {other}"),
    }

    assert_eq!(store.live_record_count(), 0);
    assert!(notify.notices.lock().unwrap().is_empty(), "no side effects");
}
