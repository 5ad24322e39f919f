//! Listeners hear exactly the movement writes: one notice per accepted
//! event, bulk rows included, and silence for everything else the engines
//! do (leave materialization, the evening sweep).

use ddk_ingest::{BulkRequest, BulkRow};
use ddk_leave::NewLeave;
use ddk_schemas::{Actor, Direction, EventSource};
use ddk_testkit::{at, day, scan, Engines, TestFacility};

#[tokio::test]
async fn one_notice_per_accepted_event_and_nothing_else() {
    let fac = TestFacility::seed(2).await;
    let (engines, _audit, notify) = Engines::recording(fac.as_store());
    let f = fac.facility_id;
    let (walker, traveller) = (fac.person(0), fac.person(1));

    // A single gate scan produces a single notice.
    engines
        .ingest
        .ingest(scan(walker, f, at(day(2024, 11, 5), 9, 0)))
        .await
        .unwrap();
    let notices = notify.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].person_id, walker);
    assert_eq!(notices[0].direction, Direction::In);
    assert_eq!(notices[0].source, EventSource::Biometric);

    // Approving leave writes records for every covered day, silently.
    let app = engines
        .leave
        .create(NewLeave {
            person_id: traveller,
            from_day: day(2024, 11, 6),
            to_day: day(2024, 11, 7),
            reason: "medical".to_string(),
            requested_by: Actor::operator("warden.rao"),
        })
        .await
        .unwrap();
    engines
        .leave
        .approve(app.leave_id, &Actor::admin("supervisor.iyer"))
        .await
        .unwrap();
    assert_eq!(notify.notices().len(), 1, "materialization is not a movement");

    // Bulk marking notifies per row that actually lands.
    let outcome = engines
        .ingest
        .ingest_bulk(BulkRequest {
            facility_id: f,
            day: day(2024, 11, 6),
            rows: vec![
                BulkRow {
                    person_id: walker,
                    direction: None,
                    status: None,
                    note: None,
                },
                BulkRow {
                    person_id: traveller,
                    direction: None,
                    status: None,
                    note: None,
                },
            ],
            recorded_by: Some("warden.rao".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(outcome.inserted.len(), 1);
    assert_eq!(outcome.skipped_on_leave, vec![traveller]);

    let notices = notify.notices();
    assert_eq!(notices.len(), 2, "the skipped row stays silent");
    assert_eq!(notices[1].person_id, walker);
    assert_eq!(notices[1].source, EventSource::Bulk);

    // The sweep writes day-end records without notifying anyone.
    engines
        .automark
        .mark_for_date(f, day(2024, 11, 6))
        .await
        .unwrap();
    assert_eq!(notify.notices().len(), 2);
}
