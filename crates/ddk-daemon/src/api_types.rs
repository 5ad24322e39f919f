//! Request and response types for all ddk-daemon HTTP endpoints.
//!
//! Plain serde structs: Axum encodes them, the route tests decode them.
//! Anything with behavior belongs in an engine crate, not here.

use chrono::NaiveDate;
use ddk_reconcile::DriftEntry;
use ddk_schemas::AutoMarkSummary;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub service: String,
    pub version: String,
    pub uptime_secs: u64,
    /// "memory" | "postgres"
    pub backend: String,
    /// Facilities with a live day-end timer.
    pub timers_running: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// Error body
// ---------------------------------------------------------------------------

/// Uniform JSON body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    /// Stable machine-readable kind ("not_found", "on_leave_conflict", ...).
    pub kind: String,
    /// Structured context for recoverable conflicts (the blocking leave
    /// application, the overlapping application). Absent otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// /v1/automark
// ---------------------------------------------------------------------------

/// Manual sweep trigger. `to` widens the run to the inclusive range
/// `[date, to]`; omitted means the single day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMarkRunRequest {
    pub facility_id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMarkRunResponse {
    pub summaries: Vec<AutoMarkSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastRunResponse {
    /// `None` when the facility has never run.
    pub summary: Option<AutoMarkSummary>,
}

// ---------------------------------------------------------------------------
// /v1/reconcile
// ---------------------------------------------------------------------------

/// Query string of GET /v1/reconcile/queue.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueParams {
    pub facility_id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveAllRequest {
    pub facility_id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub unit: Option<String>,
    pub actor: String,
}

// ---------------------------------------------------------------------------
// /v1/reconcile/records/:id
// ---------------------------------------------------------------------------

/// Operator settlement of one flagged record. Omitted fields keep the
/// stored value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRecordRequest {
    #[serde(default)]
    pub status: Option<ddk_schemas::DayStatus>,
    #[serde(default)]
    pub direction: Option<ddk_schemas::Direction>,
    #[serde(default)]
    pub note: Option<String>,
    pub actor: String,
}

// ---------------------------------------------------------------------------
// /v1/consistency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyResponse {
    pub drifted: Vec<DriftEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    /// People whose cached state was set back to IN.
    pub touched: u64,
}

// ---------------------------------------------------------------------------
// /v1/leave
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveCreateRequest {
    pub person_id: Uuid,
    pub from_day: NaiveDate,
    pub to_day: NaiveDate,
    pub reason: String,
    pub requested_by: String,
    #[serde(default)]
    pub admin: bool,
}

/// Body of the decision routes (approve / reject / cancel). `reason` is
/// required by reject and ignored by the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub actor: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarlyReturnRequest {
    pub actor: String,
    #[serde(default)]
    pub admin: bool,
    pub return_day: NaiveDate,
}

// ---------------------------------------------------------------------------
// /v1/timers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimersResponse {
    pub running: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerActionResponse {
    /// false when the timer was already in the requested state.
    pub changed: bool,
    pub running: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// /v1/consistency/:facility_id/reset  (request body)
// ---------------------------------------------------------------------------

/// Operator attribution for the bulk state reset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetRequest {
    pub actor: String,
}
