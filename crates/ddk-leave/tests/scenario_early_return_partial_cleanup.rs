//! A person reports back mid-leave. From the return day on, the generated
//! records disappear and the window closes; the days already spent away keep
//! their on-leave records.

use chrono::NaiveDate;
use ddk_audit::NullAuditSink;
use ddk_leave::{LeaveEngine, LeaveError, NewLeave};
use ddk_schemas::{Actor, Direction, LeaveStatus, Person};
use ddk_store::{LedgerStore, MemoryStore, RosterStore};
use std::sync::Arc;
use uuid::Uuid;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

async fn approved_leave() -> (Arc<MemoryStore>, LeaveEngine, Person, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let person = Person {
        person_id: Uuid::new_v4(),
        facility_id: Uuid::new_v4(),
        display_name: "resident".to_string(),
        unit: None,
        active: true,
        current_state: Direction::In,
        last_state_update: None,
    };
    store.upsert_person(person.clone()).await.unwrap();
    let engine = LeaveEngine::new(store.clone(), Arc::new(NullAuditSink));

    let app = engine
        .create(NewLeave {
            person_id: person.person_id,
            from_day: day(10),
            to_day: day(14),
            reason: "family emergency".to_string(),
            requested_by: Actor::operator("warden"),
        })
        .await
        .unwrap();
    engine
        .approve(app.leave_id, &Actor::admin("chief"))
        .await
        .unwrap();
    (store, engine, person, app.leave_id)
}

#[tokio::test]
async fn records_from_return_day_onward_are_removed() {
    let (store, engine, person, leave_id) = approved_leave().await;
    assert_eq!(store.live_record_count(), 5);

    let app = engine
        .early_return(leave_id, day(12), &Actor::operator("gatehouse"))
        .await
        .unwrap();

    assert_eq!(app.status, LeaveStatus::Approved, "status is unchanged");
    assert!(app.early_return);
    assert_eq!(app.actual_return_day, Some(day(12)));

    assert_eq!(store.live_record_count(), 2, "days 12..14 cleared");
    for d in 10..=11 {
        assert_eq!(
            store.day_records(person.person_id, day(d)).await.unwrap().len(),
            1,
            "day {d} keeps its record"
        );
    }
    for d in 12..=14 {
        assert!(
            store.day_records(person.person_id, day(d)).await.unwrap().is_empty(),
            "day {d} should be clear"
        );
    }

    // The return day is an ordinary attendance day again.
    assert!(engine
        .is_on_leave(person.person_id, day(11))
        .await
        .unwrap()
        .is_some());
    assert!(engine
        .is_on_leave(person.person_id, day(12))
        .await
        .unwrap()
        .is_none());

    let p = store.person(person.person_id).await.unwrap().unwrap();
    assert_eq!(p.current_state, Direction::In);
}

#[tokio::test]
async fn return_day_must_fall_inside_the_range() {
    let (_store, engine, _person, leave_id) = approved_leave().await;

    for bad in [day(9), day(15)] {
        let err = engine
            .early_return(leave_id, bad, &Actor::operator("gatehouse"))
            .await
            .unwrap_err();
        assert!(matches!(err, LeaveError::ValidationFailure(_)), "{bad}");
    }
}

#[tokio::test]
async fn early_return_requires_an_approved_application() {
    let store = Arc::new(MemoryStore::new());
    let person = Person {
        person_id: Uuid::new_v4(),
        facility_id: Uuid::new_v4(),
        display_name: "resident".to_string(),
        unit: None,
        active: true,
        current_state: Direction::In,
        last_state_update: None,
    };
    store.upsert_person(person.clone()).await.unwrap();
    let engine = LeaveEngine::new(store, Arc::new(NullAuditSink));

    let app = engine
        .create(NewLeave {
            person_id: person.person_id,
            from_day: day(10),
            to_day: day(14),
            reason: "family".to_string(),
            requested_by: Actor::operator("warden"),
        })
        .await
        .unwrap();

    let err = engine
        .early_return(app.leave_id, day(11), &Actor::operator("gatehouse"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LeaveError::InvalidStateTransition {
            from: LeaveStatus::Pending,
            ..
        }
    ));
}
