//! Trait ports consumed by the engine crates.
//!
//! Contract notes that every implementation must honor:
//! - reads never return soft-deleted records;
//! - same-day reads are sorted ascending by timestamp;
//! - [`LedgerStore::insert_if_day_unmarked`] combines the existence check and
//!   the insert in one operation, so two concurrent writers racing to create
//!   the first record of a (person, day) resolve to one insert and one skip.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ddk_schemas::{
    AttendanceRecord, AutoMarkSummary, DayStatus, Direction, EventSource, FacilityPolicy,
    LeaveApplication, Person,
};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Failure of a storage operation. Engines map this into their own error
/// taxonomy at the boundary.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// The addressed row does not exist.
    Missing(&'static str, Uuid),
    /// Backend failure (connection, query, serialization).
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Missing(what, id) => write!(f, "{what} {id} not found"),
            StoreError::Backend(msg) => write!(f, "storage backend error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

// ---------------------------------------------------------------------------
// RosterStore
// ---------------------------------------------------------------------------

/// People and their cached current state.
#[async_trait]
pub trait RosterStore: Send + Sync {
    /// Active people of one facility, sorted by person id for deterministic
    /// iteration.
    async fn active_people(&self, facility_id: Uuid) -> StoreResult<Vec<Person>>;

    async fn person(&self, person_id: Uuid) -> StoreResult<Option<Person>>;

    async fn upsert_person(&self, person: Person) -> StoreResult<()>;

    /// Last-writer-wins update of the cached state + its timestamp.
    async fn update_state(
        &self,
        person_id: Uuid,
        direction: Direction,
        ts: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Bulk-reset every active person of the facility to IN. Returns the
    /// number of people touched.
    async fn reset_states(&self, facility_id: Uuid, ts: DateTime<Utc>) -> StoreResult<u64>;
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

/// Outcome of a day-end conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayEndWrite {
    Inserted,
    /// A non-deleted record already existed for (person, day); nothing written.
    AlreadyMarked,
}

/// Reconciliation edit applied to one record. `None` fields keep the stored
/// value; actor and timestamp always land in `reconciled_by` / `reconciled_at`.
#[derive(Debug, Clone)]
pub struct ReconcilePatch {
    pub status: Option<DayStatus>,
    pub direction: Option<Direction>,
    pub note: Option<String>,
    pub actor: String,
    pub ts: DateTime<Utc>,
}

impl ReconcilePatch {
    /// Patch that only flips `reconciled` (bulk approval path).
    pub fn approve_only(actor: impl Into<String>, ts: DateTime<Utc>) -> Self {
        Self {
            status: None,
            direction: None,
            note: None,
            actor: actor.into(),
            ts,
        }
    }
}

/// The attendance ledger: append-mostly, soft-deletable.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert(&self, record: AttendanceRecord) -> StoreResult<()>;

    /// Non-deleted records of one (person, day), ascending by timestamp.
    async fn day_records(
        &self,
        person_id: Uuid,
        day: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>>;

    /// Insert `record` only when no non-deleted record exists yet for its
    /// (person, day). The check and the insert are one store operation.
    async fn insert_if_day_unmarked(&self, record: AttendanceRecord) -> StoreResult<DayEndWrite>;

    async fn record(&self, record_id: Uuid) -> StoreResult<Option<AttendanceRecord>>;

    /// Soft-delete the non-deleted records of `person_id` with `source` and
    /// day in `[from_day, to_day]`. Returns the number of records flagged.
    async fn soft_delete_by_source(
        &self,
        person_id: Uuid,
        source: EventSource,
        from_day: NaiveDate,
        to_day: NaiveDate,
        actor: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Apply a reconciliation patch; sets `reconciled = true`.
    async fn apply_reconciliation(
        &self,
        record_id: Uuid,
        patch: ReconcilePatch,
    ) -> StoreResult<AttendanceRecord>;

    /// Records of (facility, day) that belong in the reconciliation queue:
    /// non-deleted, with at least one issue or `status = unknown`. Optional
    /// sub-unit filter matches the person's `unit`. Sorted by (person, ts).
    async fn flagged(
        &self,
        facility_id: Uuid,
        day: NaiveDate,
        unit: Option<&str>,
    ) -> StoreResult<Vec<AttendanceRecord>>;

    /// Most recent non-deleted record of a person across all days.
    async fn latest_record(&self, person_id: Uuid) -> StoreResult<Option<AttendanceRecord>>;
}

// ---------------------------------------------------------------------------
// LeaveStore
// ---------------------------------------------------------------------------

/// Leave applications. Window semantics (`covers`, overlap) live on the
/// schema type; the store only persists and filters.
#[async_trait]
pub trait LeaveStore: Send + Sync {
    async fn create(&self, app: LeaveApplication) -> StoreResult<()>;

    async fn leave(&self, leave_id: Uuid) -> StoreResult<Option<LeaveApplication>>;

    async fn update(&self, app: LeaveApplication) -> StoreResult<()>;

    /// The approved application whose effective window covers `day`, if any.
    async fn active_leave(
        &self,
        person_id: Uuid,
        day: NaiveDate,
    ) -> StoreResult<Option<LeaveApplication>>;

    /// All approved applications of the facility whose effective window
    /// covers `day`.
    async fn approved_for_day(
        &self,
        facility_id: Uuid,
        day: NaiveDate,
    ) -> StoreResult<Vec<LeaveApplication>>;

    /// Pending or approved applications of the person whose requested range
    /// intersects `[from_day, to_day]`.
    async fn overlapping(
        &self,
        person_id: Uuid,
        from_day: NaiveDate,
        to_day: NaiveDate,
    ) -> StoreResult<Vec<LeaveApplication>>;
}

// ---------------------------------------------------------------------------
// SettingsStore
// ---------------------------------------------------------------------------

/// Per-facility policy plus the write-back slot for the last auto-mark run.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Returns stored policy, or [`FacilityPolicy::defaults`] when the
    /// facility has no row yet.
    async fn policy(&self, facility_id: Uuid) -> StoreResult<FacilityPolicy>;

    async fn put_policy(&self, policy: FacilityPolicy) -> StoreResult<()>;

    /// Facilities with a stored policy, sorted for deterministic iteration.
    async fn facilities(&self) -> StoreResult<Vec<Uuid>>;

    async fn record_run_summary(&self, summary: AutoMarkSummary) -> StoreResult<()>;

    async fn last_run_summary(&self, facility_id: Uuid)
        -> StoreResult<Option<AutoMarkSummary>>;
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// All four table ports behind one handle. Engines hold `Arc<dyn Store>` so a
/// single backend (memory or PostgreSQL) serves every table; per-table traits
/// stay separate for implementations and narrow test doubles.
pub trait Store: RosterStore + LedgerStore + LeaveStore + SettingsStore {}

impl<T: RosterStore + LedgerStore + LeaveStore + SettingsStore> Store for T {}

// ---------------------------------------------------------------------------
// NotifySink
// ---------------------------------------------------------------------------

/// Fire-and-forget "event occurred" signal, sent after a successful ledger
/// write. Implementations swallow their own failures.
pub trait NotifySink: Send + Sync {
    fn notify(&self, notice: &ddk_schemas::EventNotice);
}

/// Drops every notice. Default sink for tests and the CLI.
#[derive(Debug, Default)]
pub struct NullNotify;

impl NotifySink for NullNotify {
    fn notify(&self, _notice: &ddk_schemas::EventNotice) {}
}
