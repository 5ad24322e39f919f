//! Shared fixtures for cross-crate scenario tests: a seeded in-memory
//! facility, a fully wired engine bundle, and capturing sinks so tests can
//! assert on the audit trail and the notification stream.
//!
//! Everything here panics on failure; this crate never ships in a binary.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use ddk_audit::{AuditEntry, AuditSink};
use ddk_automark::{AutoMarkEngine, TimerSupervisor};
use ddk_ingest::{EventInput, IngestEngine};
use ddk_leave::LeaveEngine;
use ddk_reconcile::ReconcileEngine;
use ddk_schemas::{Direction, EventNotice, EventSource, Person};
use ddk_store::{MemoryStore, NotifySink, RosterStore, Store};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// TestFacility
// ---------------------------------------------------------------------------

/// One in-memory facility with `n` seeded active people, all starting IN.
pub struct TestFacility {
    pub store: Arc<MemoryStore>,
    pub facility_id: Uuid,
    pub people: Vec<Uuid>,
}

impl TestFacility {
    pub async fn seed(n: usize) -> Self {
        let store = Arc::new(MemoryStore::new());
        let facility_id = Uuid::new_v4();
        let mut people = Vec::with_capacity(n);
        for i in 0..n {
            let person_id = Uuid::new_v4();
            store
                .upsert_person(Person {
                    person_id,
                    facility_id,
                    display_name: format!("resident-{i}"),
                    unit: Some("B-2".to_string()),
                    active: true,
                    current_state: Direction::In,
                    last_state_update: None,
                })
                .await
                .expect("seed person");
            people.push(person_id);
        }
        Self {
            store,
            facility_id,
            people,
        }
    }

    pub fn person(&self, i: usize) -> Uuid {
        self.people[i]
    }

    pub fn as_store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }
}

// ---------------------------------------------------------------------------
// Engines
// ---------------------------------------------------------------------------

/// The full engine bundle over one shared store.
pub struct Engines {
    pub ingest: Arc<IngestEngine>,
    pub leave: Arc<LeaveEngine>,
    pub automark: Arc<AutoMarkEngine>,
    pub reconcile: Arc<ReconcileEngine>,
    pub timers: Arc<TimerSupervisor>,
}

/// Wire every engine to the same store and sinks, the way the daemon does.
pub fn wire(
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    notify: Arc<dyn NotifySink>,
) -> Engines {
    let ingest = Arc::new(IngestEngine::new(store.clone(), audit.clone(), notify));
    let leave = Arc::new(LeaveEngine::new(store.clone(), audit.clone()));
    let automark = Arc::new(AutoMarkEngine::new(store.clone(), leave.clone(), audit.clone()));
    let reconcile = Arc::new(ReconcileEngine::new(store.clone(), audit));
    let timers = Arc::new(TimerSupervisor::new(automark.clone(), store));
    Engines {
        ingest,
        leave,
        automark,
        reconcile,
        timers,
    }
}

impl Engines {
    /// Bundle whose sinks record everything for assertions.
    pub fn recording(store: Arc<dyn Store>) -> (Self, Arc<RecordingAudit>, Arc<CapturingNotify>) {
        let audit = Arc::new(RecordingAudit::default());
        let notify = Arc::new(CapturingNotify::default());
        let engines = wire(store, audit.clone(), notify.clone());
        (engines, audit, notify)
    }
}

// ---------------------------------------------------------------------------
// Capturing sinks
// ---------------------------------------------------------------------------

/// Audit sink that keeps every entry in memory.
#[derive(Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAudit {
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit mutex").clone()
    }

    /// `(entity, action)` pairs in report order.
    pub fn actions(&self) -> Vec<(String, String)> {
        self.entries()
            .into_iter()
            .map(|e| (e.entity, e.action))
            .collect()
    }
}

impl AuditSink for RecordingAudit {
    fn log(&self, entry: AuditEntry) {
        self.entries.lock().expect("audit mutex").push(entry);
    }
}

/// Notification sink that keeps every notice in memory.
#[derive(Default)]
pub struct CapturingNotify {
    notices: Mutex<Vec<EventNotice>>,
}

impl CapturingNotify {
    pub fn notices(&self) -> Vec<EventNotice> {
        self.notices.lock().expect("notify mutex").clone()
    }
}

impl NotifySink for CapturingNotify {
    fn notify(&self, notice: &EventNotice) {
        self.notices.lock().expect("notify mutex").push(notice.clone());
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// UTC instant inside `d`. Seeded facilities run on the UTC default policy,
/// so this is also the facility-local time.
pub fn at(d: NaiveDate, hour: u32, min: u32) -> DateTime<Utc> {
    Utc.from_utc_datetime(&d.and_hms_opt(hour, min, 0).expect("valid time"))
}

/// Type-omitted device scan; direction resolves by the toggle rule.
pub fn scan(person_id: Uuid, facility_id: Uuid, ts: DateTime<Utc>) -> EventInput {
    EventInput {
        person_id,
        facility_id,
        ts_utc: ts,
        direction: None,
        source: EventSource::Biometric,
        status: None,
        device_id: Some("gate-7".to_string()),
        note: None,
        override_leave_id: None,
        recorded_by: None,
    }
}

/// Operator entry with an explicit direction.
pub fn manual(
    person_id: Uuid,
    facility_id: Uuid,
    ts: DateTime<Utc>,
    direction: Direction,
) -> EventInput {
    EventInput {
        direction: Some(direction),
        source: EventSource::Manual,
        device_id: None,
        recorded_by: Some("warden.rao".to_string()),
        ..scan(person_id, facility_id, ts)
    }
}
