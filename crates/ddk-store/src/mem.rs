//! In-memory implementation of every port, behind one mutex.
//!
//! Reference implementation for tests and the dev daemon. One lock guards
//! all tables, which makes `insert_if_day_unmarked` trivially atomic — the
//! property the PostgreSQL store reproduces with partial unique indexes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ddk_schemas::{
    AttendanceRecord, AutoMarkSummary, Direction, EventSource, FacilityPolicy, LeaveApplication,
    LeaveStatus, Person,
};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::ports::{
    DayEndWrite, LeaveStore, LedgerStore, ReconcilePatch, RosterStore, SettingsStore, StoreError,
    StoreResult,
};

#[derive(Default)]
struct Inner {
    people: HashMap<Uuid, Person>,
    records: HashMap<Uuid, AttendanceRecord>,
    leaves: HashMap<Uuid, LeaveApplication>,
    policies: HashMap<Uuid, FacilityPolicy>,
    summaries: HashMap<Uuid, AutoMarkSummary>,
}

/// All-ports store over process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Test/seed helper: total number of non-deleted ledger records.
    pub fn live_record_count(&self) -> usize {
        self.lock()
            .records
            .values()
            .filter(|r| !r.is_deleted())
            .count()
    }
}

fn sorted_asc(mut records: Vec<AttendanceRecord>) -> Vec<AttendanceRecord> {
    records.sort_by(|a, b| (a.ts_utc, a.record_id).cmp(&(b.ts_utc, b.record_id)));
    records
}

// ---------------------------------------------------------------------------
// RosterStore
// ---------------------------------------------------------------------------

#[async_trait]
impl RosterStore for MemoryStore {
    async fn active_people(&self, facility_id: Uuid) -> StoreResult<Vec<Person>> {
        let inner = self.lock();
        let mut people: Vec<Person> = inner
            .people
            .values()
            .filter(|p| p.facility_id == facility_id && p.active)
            .cloned()
            .collect();
        people.sort_by_key(|p| p.person_id);
        Ok(people)
    }

    async fn person(&self, person_id: Uuid) -> StoreResult<Option<Person>> {
        Ok(self.lock().people.get(&person_id).cloned())
    }

    async fn upsert_person(&self, person: Person) -> StoreResult<()> {
        self.lock().people.insert(person.person_id, person);
        Ok(())
    }

    async fn update_state(
        &self,
        person_id: Uuid,
        direction: Direction,
        ts: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.lock();
        let person = inner
            .people
            .get_mut(&person_id)
            .ok_or(StoreError::Missing("person", person_id))?;
        person.current_state = direction;
        person.last_state_update = Some(ts);
        Ok(())
    }

    async fn reset_states(&self, facility_id: Uuid, ts: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.lock();
        let mut touched = 0u64;
        for person in inner
            .people
            .values_mut()
            .filter(|p| p.facility_id == facility_id && p.active)
        {
            person.current_state = Direction::In;
            person.last_state_update = Some(ts);
            touched += 1;
        }
        Ok(touched)
    }
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert(&self, record: AttendanceRecord) -> StoreResult<()> {
        self.lock().records.insert(record.record_id, record);
        Ok(())
    }

    async fn day_records(
        &self,
        person_id: Uuid,
        day: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let inner = self.lock();
        let records: Vec<AttendanceRecord> = inner
            .records
            .values()
            .filter(|r| r.person_id == person_id && r.day == day && !r.is_deleted())
            .cloned()
            .collect();
        Ok(sorted_asc(records))
    }

    async fn insert_if_day_unmarked(&self, record: AttendanceRecord) -> StoreResult<DayEndWrite> {
        let mut inner = self.lock();
        let marked = inner
            .records
            .values()
            .any(|r| r.person_id == record.person_id && r.day == record.day && !r.is_deleted());
        if marked {
            return Ok(DayEndWrite::AlreadyMarked);
        }
        inner.records.insert(record.record_id, record);
        Ok(DayEndWrite::Inserted)
    }

    async fn record(&self, record_id: Uuid) -> StoreResult<Option<AttendanceRecord>> {
        Ok(self.lock().records.get(&record_id).cloned())
    }

    async fn soft_delete_by_source(
        &self,
        person_id: Uuid,
        source: EventSource,
        from_day: NaiveDate,
        to_day: NaiveDate,
        actor: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut inner = self.lock();
        let mut flagged = 0u64;
        for record in inner.records.values_mut().filter(|r| {
            r.person_id == person_id
                && r.source == source
                && r.day >= from_day
                && r.day <= to_day
                && !r.is_deleted()
        }) {
            record.deleted_by = Some(actor.to_string());
            record.deleted_at = Some(ts);
            flagged += 1;
        }
        Ok(flagged)
    }

    async fn apply_reconciliation(
        &self,
        record_id: Uuid,
        patch: ReconcilePatch,
    ) -> StoreResult<AttendanceRecord> {
        let mut inner = self.lock();
        let record = inner
            .records
            .get_mut(&record_id)
            .filter(|r| !r.is_deleted())
            .ok_or(StoreError::Missing("attendance record", record_id))?;
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(direction) = patch.direction {
            record.direction = direction;
        }
        if let Some(note) = patch.note {
            record.note = Some(note);
        }
        record.reconciled = true;
        record.reconciled_by = Some(patch.actor);
        record.reconciled_at = Some(patch.ts);
        Ok(record.clone())
    }

    async fn flagged(
        &self,
        facility_id: Uuid,
        day: NaiveDate,
        unit: Option<&str>,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let inner = self.lock();
        let records: Vec<AttendanceRecord> = inner
            .records
            .values()
            .filter(|r| {
                r.facility_id == facility_id && r.day == day && !r.is_deleted() && r.is_flagged()
            })
            .filter(|r| match unit {
                None => true,
                Some(u) => inner
                    .people
                    .get(&r.person_id)
                    .and_then(|p| p.unit.as_deref())
                    == Some(u),
            })
            .cloned()
            .collect();
        let mut records = records;
        records.sort_by(|a, b| {
            (a.person_id, a.ts_utc, a.record_id).cmp(&(b.person_id, b.ts_utc, b.record_id))
        });
        Ok(records)
    }

    async fn latest_record(&self, person_id: Uuid) -> StoreResult<Option<AttendanceRecord>> {
        let inner = self.lock();
        Ok(inner
            .records
            .values()
            .filter(|r| r.person_id == person_id && !r.is_deleted())
            .max_by(|a, b| (a.ts_utc, a.record_id).cmp(&(b.ts_utc, b.record_id)))
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// LeaveStore
// ---------------------------------------------------------------------------

#[async_trait]
impl LeaveStore for MemoryStore {
    async fn create(&self, app: LeaveApplication) -> StoreResult<()> {
        self.lock().leaves.insert(app.leave_id, app);
        Ok(())
    }

    async fn leave(&self, leave_id: Uuid) -> StoreResult<Option<LeaveApplication>> {
        Ok(self.lock().leaves.get(&leave_id).cloned())
    }

    async fn update(&self, app: LeaveApplication) -> StoreResult<()> {
        let mut inner = self.lock();
        if !inner.leaves.contains_key(&app.leave_id) {
            return Err(StoreError::Missing("leave application", app.leave_id));
        }
        inner.leaves.insert(app.leave_id, app);
        Ok(())
    }

    async fn active_leave(
        &self,
        person_id: Uuid,
        day: NaiveDate,
    ) -> StoreResult<Option<LeaveApplication>> {
        let inner = self.lock();
        Ok(inner
            .leaves
            .values()
            .filter(|l| {
                l.person_id == person_id && l.status == LeaveStatus::Approved && l.covers(day)
            })
            .min_by_key(|l| l.from_day)
            .cloned())
    }

    async fn approved_for_day(
        &self,
        facility_id: Uuid,
        day: NaiveDate,
    ) -> StoreResult<Vec<LeaveApplication>> {
        let inner = self.lock();
        let mut apps: Vec<LeaveApplication> = inner
            .leaves
            .values()
            .filter(|l| {
                l.facility_id == facility_id && l.status == LeaveStatus::Approved && l.covers(day)
            })
            .cloned()
            .collect();
        apps.sort_by_key(|l| l.leave_id);
        Ok(apps)
    }

    async fn overlapping(
        &self,
        person_id: Uuid,
        from_day: NaiveDate,
        to_day: NaiveDate,
    ) -> StoreResult<Vec<LeaveApplication>> {
        let inner = self.lock();
        let mut apps: Vec<LeaveApplication> = inner
            .leaves
            .values()
            .filter(|l| {
                l.person_id == person_id
                    && matches!(l.status, LeaveStatus::Pending | LeaveStatus::Approved)
                    && l.overlaps(from_day, to_day)
            })
            .cloned()
            .collect();
        apps.sort_by_key(|l| l.leave_id);
        Ok(apps)
    }
}

// ---------------------------------------------------------------------------
// SettingsStore
// ---------------------------------------------------------------------------

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn policy(&self, facility_id: Uuid) -> StoreResult<FacilityPolicy> {
        Ok(self
            .lock()
            .policies
            .get(&facility_id)
            .cloned()
            .unwrap_or_else(|| FacilityPolicy::defaults(facility_id)))
    }

    async fn put_policy(&self, policy: FacilityPolicy) -> StoreResult<()> {
        self.lock().policies.insert(policy.facility_id, policy);
        Ok(())
    }

    async fn facilities(&self) -> StoreResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.lock().policies.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn record_run_summary(&self, summary: AutoMarkSummary) -> StoreResult<()> {
        self.lock().summaries.insert(summary.facility_id, summary);
        Ok(())
    }

    async fn last_run_summary(
        &self,
        facility_id: Uuid,
    ) -> StoreResult<Option<AutoMarkSummary>> {
        Ok(self.lock().summaries.get(&facility_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
