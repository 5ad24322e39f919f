//! Re-running a sweep for an already-processed date changes nothing: the
//! day-end existence check is the sole idempotence mechanism, and it holds
//! across repeats and backfill ranges.

use chrono::NaiveDate;
use ddk_audit::NullAuditSink;
use ddk_automark::AutoMarkEngine;
use ddk_leave::LeaveEngine;
use ddk_schemas::{Direction, Person};
use ddk_store::{MemoryStore, RosterStore};
use std::sync::Arc;
use uuid::Uuid;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, d).unwrap()
}

async fn seeded(people: usize) -> (Arc<MemoryStore>, AutoMarkEngine, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let facility = Uuid::new_v4();
    for i in 0..people {
        store
            .upsert_person(Person {
                person_id: Uuid::new_v4(),
                facility_id: facility,
                display_name: format!("resident-{i}"),
                unit: None,
                active: true,
                current_state: if i % 2 == 0 { Direction::In } else { Direction::Out },
                last_state_update: None,
            })
            .await
            .unwrap();
    }
    let leave = Arc::new(LeaveEngine::new(store.clone(), Arc::new(NullAuditSink)));
    let engine = AutoMarkEngine::new(store.clone(), leave, Arc::new(NullAuditSink));
    (store, engine, facility)
}

#[tokio::test]
async fn second_run_skips_every_person() {
    let (store, engine, facility) = seeded(5).await;

    let first = engine.mark_for_date(facility, day(20)).await.unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(first.already_marked, 0);
    assert_eq!(first.marked_present + first.marked_absent, 5);
    assert_eq!(store.live_record_count(), 5);

    let second = engine.mark_for_date(facility, day(20)).await.unwrap();
    assert_eq!(second.total, 5);
    assert_eq!(second.already_marked, 5, "repeat only skips");
    assert_eq!(second.marked_present, 0);
    assert_eq!(second.marked_absent, 0);
    assert_eq!(store.live_record_count(), 5, "ledger unchanged");
}

#[tokio::test]
async fn range_backfill_produces_one_summary_per_day() {
    let (store, engine, facility) = seeded(3).await;

    // Day 21 was already swept once.
    engine.mark_for_date(facility, day(21)).await.unwrap();

    let summaries = engine
        .mark_for_range(facility, day(20), day(22))
        .await
        .unwrap();
    assert_eq!(summaries.len(), 3);
    assert_eq!(summaries[0].day, day(20));
    assert_eq!(summaries[0].already_marked, 0);
    assert_eq!(summaries[1].day, day(21));
    assert_eq!(summaries[1].already_marked, 3, "prior sweep holds");
    assert_eq!(summaries[2].day, day(22));
    assert_eq!(summaries[2].already_marked, 0);

    assert_eq!(store.live_record_count(), 9, "3 people x 3 days");
}
