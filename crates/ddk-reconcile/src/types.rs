use chrono::{DateTime, Utc};
use ddk_schemas::{AttendanceRecord, DayStatus, Direction};
use ddk_store::StoreError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Triage counters over one queue. Severity counts are record counts: a
/// record carrying both a warning and an info contributes to both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub total: u64,
    pub info: u64,
    pub warning: u64,
    pub error: u64,
    pub unknown_status: u64,
    pub unreconciled: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileQueue {
    pub records: Vec<AttendanceRecord>,
    pub counts: QueueCounts,
}

/// Operator edit applied to one record; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordEdit {
    #[serde(default)]
    pub status: Option<DayStatus>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ApproveAllOutcome {
    pub approved: u64,
    /// Records left alone because they carry an error-severity issue.
    pub excluded: u64,
}

/// One cached state that disagrees with the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct DriftEntry {
    pub person_id: Uuid,
    pub display_name: String,
    pub current_state: Direction,
    pub last_ledger_direction: Direction,
    pub last_ledger_ts: DateTime<Utc>,
}

#[derive(Debug)]
pub enum ReconcileError {
    NotFound(Uuid),
    Backend(StoreError),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::NotFound(id) => write!(f, "record {id} not found"),
            ReconcileError::Backend(err) => write!(f, "storage failure: {err}"),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconcileError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Missing(_, id) => ReconcileError::NotFound(id),
            other => ReconcileError::Backend(other),
        }
    }
}
