use chrono::{DateTime, NaiveDate, Utc};
use ddk_schemas::{AttendanceRecord, DayStatus, Direction, EventSource, LeaveApplication, ValidationIssue};
use ddk_store::StoreError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One raw movement event handed to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventInput {
    pub person_id: Uuid,
    pub facility_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    /// `None` toggles from the last non-deleted same-day record.
    #[serde(default)]
    pub direction: Option<Direction>,
    pub source: EventSource,
    /// `None` derives from the applied direction.
    #[serde(default)]
    pub status: Option<DayStatus>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Names the leave application the caller knowingly scans over.
    #[serde(default)]
    pub override_leave_id: Option<Uuid>,
    /// Operator attribution; omitted for device scans.
    #[serde(default)]
    pub recorded_by: Option<String>,
}

/// What a successful ingest hands back to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub record: AttendanceRecord,
    /// The direction actually written (resolved from the toggle rule when
    /// the input carried none).
    pub applied: Direction,
    pub issues: Vec<ValidationIssue>,
}

/// One row of a bulk day-marking import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRow {
    pub person_id: Uuid,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub status: Option<DayStatus>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkRequest {
    pub facility_id: Uuid,
    /// Facility-local date the rows mark; every row is timestamped at that
    /// date's local noon.
    pub day: NaiveDate,
    pub rows: Vec<BulkRow>,
    #[serde(default)]
    pub recorded_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkRowError {
    pub person_id: Uuid,
    pub message: String,
}

/// Mixed per-row result of a batch. The batch call itself succeeds whenever
/// the rows could be attempted at all.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkOutcome {
    /// Record ids written.
    pub inserted: Vec<Uuid>,
    /// Person ids skipped because of an approved leave.
    pub skipped_on_leave: Vec<Uuid>,
    pub errors: Vec<BulkRowError>,
}

#[derive(Debug)]
pub enum IngestError {
    /// Unknown or inactive person.
    NotFound(Uuid),
    /// The event names a facility the person does not belong to.
    WrongFacility {
        person_id: Uuid,
        /// The facility the person actually belongs to.
        facility_id: Uuid,
    },
    /// Approved leave covers the event's day and no override was given.
    OnLeaveConflict { leave: LeaveApplication },
    ValidationFailure(String),
    Backend(StoreError),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::NotFound(id) => write!(f, "unknown or inactive person {id}"),
            IngestError::WrongFacility {
                person_id,
                facility_id,
            } => write!(f, "person {person_id} belongs to facility {facility_id}"),
            IngestError::OnLeaveConflict { leave } => write!(
                f,
                "person {} is on approved leave {} until {}",
                leave.person_id, leave.leave_id, leave.to_day
            ),
            IngestError::ValidationFailure(msg) => write!(f, "validation failure: {msg}"),
            IngestError::Backend(err) => write!(f, "storage failure: {err}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        IngestError::Backend(err)
    }
}
