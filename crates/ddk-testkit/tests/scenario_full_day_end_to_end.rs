//! A full facility day across the engines: overnight state left by
//! yesterday's scans, this morning's gate traffic, then the evening sweep
//! marking whoever the gates never saw. A clean day leaves the operator
//! queue empty.

use ddk_schemas::{DayStatus, Direction, EventSource};
use ddk_store::{LedgerStore, SettingsStore};
use ddk_testkit::{at, day, scan, Engines, TestFacility};

#[tokio::test]
async fn scans_then_evening_sweep_settle_every_person() {
    let fac = TestFacility::seed(3).await;
    let (engines, _audit, _notify) = Engines::recording(fac.as_store());
    let f = fac.facility_id;
    let (full_day, half_day, away) = (fac.person(0), fac.person(1), fac.person(2));

    let yesterday = day(2024, 11, 4);
    let today = day(2024, 11, 5);

    // Yesterday `away` left in the evening and never came back.
    engines
        .ingest
        .ingest(scan(away, f, at(yesterday, 9, 0)))
        .await
        .unwrap();
    let left = engines
        .ingest
        .ingest(scan(away, f, at(yesterday, 17, 0)))
        .await
        .unwrap();
    assert_eq!(left.applied, Direction::Out);

    // Today: one full in/out pair, one sign-in that never signs out.
    engines
        .ingest
        .ingest(scan(full_day, f, at(today, 8, 0)))
        .await
        .unwrap();
    let evening = engines
        .ingest
        .ingest(scan(full_day, f, at(today, 18, 0)))
        .await
        .unwrap();
    assert_eq!(evening.record.status, DayStatus::LeftEarly);
    engines
        .ingest
        .ingest(scan(half_day, f, at(today, 8, 30)))
        .await
        .unwrap();

    let summary = engines.automark.mark_for_date(f, today).await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.already_marked, 2, "scanned people already hold records");
    assert_eq!(summary.marked_absent, 1, "nobody saw `away` today");
    assert_eq!(summary.marked_present, 0);
    assert_eq!(summary.errors, 0);

    // The sweep writes settled auto records, not operator work.
    let records = fac.store.day_records(away, today).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, DayStatus::Absent);
    assert_eq!(records[0].source, EventSource::Auto);
    assert!(records[0].reconciled);

    let queue = engines.reconcile.queue(f, today, None).await.unwrap();
    assert!(queue.records.is_empty());
    assert_eq!(queue.counts.total, 0);

    // The run is findable afterwards.
    let last = fac.store.last_run_summary(f).await.unwrap().unwrap();
    assert_eq!(last.day, today);
    assert_eq!(last.marked_absent, 1);

    // Re-running changes nothing: every person now carries a day record.
    let rerun = engines.automark.mark_for_date(f, today).await.unwrap();
    assert_eq!(rerun.already_marked, 3);
    assert_eq!(rerun.marked_absent, 0);
}
