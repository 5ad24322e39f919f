//! Axum router and all HTTP handlers for ddk-daemon.
//!
//! Everything funnels through `build_router`; the binary attaches middleware
//! around it and the scenario tests in `tests/` drive it bare via oneshot,
//! which is why the handlers stay `pub(crate)`.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use ddk_automark::AutoMarkError;
use ddk_ingest::{BulkOutcome, BulkRequest, EventInput, IngestError, IngestOutcome};
use ddk_leave::{LeaveError, NewLeave};
use ddk_reconcile::{ApproveAllOutcome, ReconcileError, ReconcileQueue, RecordEdit};
use ddk_schemas::{Actor, AttendanceRecord, LeaveApplication};
use ddk_store::StoreError;
use futures_util::{Stream, StreamExt};
use serde_json::json;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;
use uuid::Uuid;

use crate::{
    api_types::{
        ApproveAllRequest, AutoMarkRunRequest, AutoMarkRunResponse, ConsistencyResponse,
        DecisionRequest, EarlyReturnRequest, ErrorBody, HealthResponse, LastRunResponse,
        LeaveCreateRequest, QueueParams, ReconcileRecordRequest, ResetRequest, ResetResponse,
        StatusResponse, TimerActionResponse, TimersResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// The full route table over the shared state, with no middleware: CORS and
/// request tracing go on in `main.rs`, keeping the bare router testable.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/events", post(ingest_event))
        .route("/v1/events/bulk", post(ingest_bulk))
        .route("/v1/automark/run", post(automark_run))
        .route("/v1/automark/:facility_id/last", get(automark_last))
        .route("/v1/reconcile/queue", get(reconcile_queue))
        .route("/v1/reconcile/records/:record_id", post(reconcile_record))
        .route("/v1/reconcile/approve-all", post(reconcile_approve_all))
        .route("/v1/consistency/:facility_id", get(consistency_check))
        .route("/v1/consistency/:facility_id/reset", post(consistency_reset))
        .route("/v1/leave", post(leave_create))
        .route("/v1/leave/:leave_id", get(leave_get))
        .route("/v1/leave/:leave_id/approve", post(leave_approve))
        .route("/v1/leave/:leave_id/reject", post(leave_reject))
        .route("/v1/leave/:leave_id/cancel", post(leave_cancel))
        .route("/v1/leave/:leave_id/early-return", post(leave_early_return))
        .route("/v1/timers", get(timers))
        .route("/v1/timers/:facility_id/start", post(timer_start))
        .route("/v1/timers/:facility_id/stop", post(timer_stop))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// ApiError — engine failures onto the HTTP taxonomy
// ---------------------------------------------------------------------------

/// Engine failure carried to the wire: one status code, one stable `kind`,
/// optional structured detail for recoverable conflicts.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    pub detail: Option<serde_json::Value>,
}

impl ApiError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
                kind: self.kind.to_string(),
                detail: self.detail,
            }),
        )
            .into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        let message = err.to_string();
        match err {
            IngestError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            IngestError::WrongFacility { .. } => {
                Self::new(StatusCode::FORBIDDEN, "wrong_facility", message)
            }
            // The blocking application rides along so a client can offer the
            // explicit-override path without a second lookup.
            IngestError::OnLeaveConflict { leave } => Self {
                status: StatusCode::CONFLICT,
                kind: "on_leave_conflict",
                message,
                detail: Some(json!({
                    "leave_id": leave.leave_id,
                    "from_day": leave.from_day,
                    "to_day": leave.to_day,
                })),
            },
            IngestError::ValidationFailure(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_failure", message)
            }
            IngestError::Backend(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "backend", message)
            }
        }
    }
}

impl From<LeaveError> for ApiError {
    fn from(err: LeaveError) -> Self {
        let message = err.to_string();
        match err {
            LeaveError::ValidationFailure(_) => {
                Self::new(StatusCode::BAD_REQUEST, "validation_failure", message)
            }
            LeaveError::OverlappingLeave { existing } => Self {
                status: StatusCode::CONFLICT,
                kind: "overlapping_leave",
                message,
                detail: Some(json!({
                    "leave_id": existing.leave_id,
                    "status": existing.status.as_str(),
                    "from_day": existing.from_day,
                    "to_day": existing.to_day,
                })),
            },
            LeaveError::InvalidStateTransition { .. } => {
                Self::new(StatusCode::CONFLICT, "invalid_state_transition", message)
            }
            LeaveError::Forbidden { .. } => Self::new(StatusCode::FORBIDDEN, "forbidden", message),
            LeaveError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            LeaveError::Backend(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "backend", message)
            }
        }
    }
}

impl From<AutoMarkError> for ApiError {
    fn from(err: AutoMarkError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "backend", err.to_string())
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        let message = err.to_string();
        match err {
            ReconcileError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            ReconcileError::Backend(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "backend", message)
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::Missing(..) => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            StoreError::Backend(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "backend", message)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StatusResponse {
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
            uptime_secs: uptime_secs(),
            backend: st.backend.to_string(),
            timers_running: st.timers.running(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/events
// ---------------------------------------------------------------------------

/// Single-event ingest. Successful writes already reach the SSE bus through
/// the engine's notification sink; nothing to re-broadcast here.
pub(crate) async fn ingest_event(
    State(st): State<Arc<AppState>>,
    Json(input): Json<EventInput>,
) -> Result<Json<IngestOutcome>, ApiError> {
    let outcome = st.ingest.ingest(input).await?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// POST /v1/events/bulk
// ---------------------------------------------------------------------------

/// Batch day-marking. Always 200 when the batch could be attempted; per-row
/// failures ride in the outcome.
pub(crate) async fn ingest_bulk(
    State(st): State<Arc<AppState>>,
    Json(req): Json<BulkRequest>,
) -> Result<Json<BulkOutcome>, ApiError> {
    let outcome = st.ingest.ingest_bulk(req).await?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// POST /v1/automark/run
// ---------------------------------------------------------------------------

pub(crate) async fn automark_run(
    State(st): State<Arc<AppState>>,
    Json(req): Json<AutoMarkRunRequest>,
) -> Result<Json<AutoMarkRunResponse>, ApiError> {
    let summaries = match req.to {
        Some(to) => {
            st.automark
                .mark_for_range(req.facility_id, req.date, to)
                .await?
        }
        None => vec![st.automark.mark_for_date(req.facility_id, req.date).await?],
    };

    info!(facility = %req.facility_id, runs = summaries.len(), "automark/run");
    for summary in &summaries {
        let _ = st.bus.send(BusMsg::AutoMark(summary.clone()));
    }

    Ok(Json(AutoMarkRunResponse { summaries }))
}

// ---------------------------------------------------------------------------
// GET /v1/automark/:facility_id/last
// ---------------------------------------------------------------------------

pub(crate) async fn automark_last(
    State(st): State<Arc<AppState>>,
    Path(facility_id): Path<Uuid>,
) -> Result<Json<LastRunResponse>, ApiError> {
    let summary = st.store.last_run_summary(facility_id).await?;
    Ok(Json(LastRunResponse { summary }))
}

// ---------------------------------------------------------------------------
// GET /v1/reconcile/queue
// ---------------------------------------------------------------------------

pub(crate) async fn reconcile_queue(
    State(st): State<Arc<AppState>>,
    Query(params): Query<QueueParams>,
) -> Result<Json<ReconcileQueue>, ApiError> {
    let queue = st
        .reconcile
        .queue(params.facility_id, params.date, params.unit.as_deref())
        .await?;
    Ok(Json(queue))
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/records/:record_id
// ---------------------------------------------------------------------------

pub(crate) async fn reconcile_record(
    State(st): State<Arc<AppState>>,
    Path(record_id): Path<Uuid>,
    Json(req): Json<ReconcileRecordRequest>,
) -> Result<Json<AttendanceRecord>, ApiError> {
    let actor = Actor::operator(req.actor);
    let edit = RecordEdit {
        status: req.status,
        direction: req.direction,
        note: req.note,
    };
    let record = st.reconcile.reconcile_record(record_id, edit, &actor).await?;
    Ok(Json(record))
}

// ---------------------------------------------------------------------------
// POST /v1/reconcile/approve-all
// ---------------------------------------------------------------------------

pub(crate) async fn reconcile_approve_all(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ApproveAllRequest>,
) -> Result<Json<ApproveAllOutcome>, ApiError> {
    let actor = Actor::operator(req.actor);
    let outcome = st
        .reconcile
        .approve_all(req.facility_id, req.date, req.unit.as_deref(), &actor)
        .await?;
    Ok(Json(outcome))
}

// ---------------------------------------------------------------------------
// GET /v1/consistency/:facility_id
// ---------------------------------------------------------------------------

pub(crate) async fn consistency_check(
    State(st): State<Arc<AppState>>,
    Path(facility_id): Path<Uuid>,
) -> Result<Json<ConsistencyResponse>, ApiError> {
    let drifted = st.reconcile.check_state_consistency(facility_id).await?;
    Ok(Json(ConsistencyResponse { drifted }))
}

// ---------------------------------------------------------------------------
// POST /v1/consistency/:facility_id/reset
// ---------------------------------------------------------------------------

pub(crate) async fn consistency_reset(
    State(st): State<Arc<AppState>>,
    Path(facility_id): Path<Uuid>,
    Json(req): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, ApiError> {
    let actor = Actor::operator(req.actor);
    let touched = st.reconcile.reset_all_states(facility_id, &actor).await?;

    info!(facility = %facility_id, touched, "consistency/reset");
    let _ = st.bus.send(BusMsg::LogLine {
        level: "WARN".to_string(),
        msg: format!("facility {facility_id}: {touched} cached states reset to IN"),
    });

    Ok(Json(ResetResponse { touched }))
}

// ---------------------------------------------------------------------------
// POST /v1/leave
// ---------------------------------------------------------------------------

pub(crate) async fn leave_create(
    State(st): State<Arc<AppState>>,
    Json(req): Json<LeaveCreateRequest>,
) -> Result<Json<LeaveApplication>, ApiError> {
    let app = st
        .leave
        .create(NewLeave {
            person_id: req.person_id,
            from_day: req.from_day,
            to_day: req.to_day,
            reason: req.reason,
            requested_by: Actor {
                name: req.requested_by,
                admin: req.admin,
            },
        })
        .await?;
    Ok(Json(app))
}

// ---------------------------------------------------------------------------
// GET /v1/leave/:leave_id
// ---------------------------------------------------------------------------

pub(crate) async fn leave_get(
    State(st): State<Arc<AppState>>,
    Path(leave_id): Path<Uuid>,
) -> Result<Json<LeaveApplication>, ApiError> {
    match st.store.leave(leave_id).await? {
        Some(app) => Ok(Json(app)),
        None => Err(ApiError::not_found(format!(
            "no such leave application: {leave_id}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/leave/:leave_id/approve | reject | cancel | early-return
// ---------------------------------------------------------------------------

fn decision_actor(req: &DecisionRequest) -> Actor {
    Actor {
        name: req.actor.clone(),
        admin: req.admin,
    }
}

pub(crate) async fn leave_approve(
    State(st): State<Arc<AppState>>,
    Path(leave_id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<LeaveApplication>, ApiError> {
    let app = st.leave.approve(leave_id, &decision_actor(&req)).await?;
    Ok(Json(app))
}

pub(crate) async fn leave_reject(
    State(st): State<Arc<AppState>>,
    Path(leave_id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<LeaveApplication>, ApiError> {
    let actor = decision_actor(&req);
    let reason = req.reason.as_deref().unwrap_or("");
    let app = st.leave.reject(leave_id, &actor, reason).await?;
    Ok(Json(app))
}

pub(crate) async fn leave_cancel(
    State(st): State<Arc<AppState>>,
    Path(leave_id): Path<Uuid>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<LeaveApplication>, ApiError> {
    let app = st.leave.cancel(leave_id, &decision_actor(&req)).await?;
    Ok(Json(app))
}

pub(crate) async fn leave_early_return(
    State(st): State<Arc<AppState>>,
    Path(leave_id): Path<Uuid>,
    Json(req): Json<EarlyReturnRequest>,
) -> Result<Json<LeaveApplication>, ApiError> {
    let actor = Actor {
        name: req.actor,
        admin: req.admin,
    };
    let app = st
        .leave
        .early_return(leave_id, req.return_day, &actor)
        .await?;
    Ok(Json(app))
}

// ---------------------------------------------------------------------------
// GET /v1/timers
// ---------------------------------------------------------------------------

pub(crate) async fn timers(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(TimersResponse {
            running: st.timers.running(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/timers/:facility_id/start  /v1/timers/:facility_id/stop
// ---------------------------------------------------------------------------

pub(crate) async fn timer_start(
    State(st): State<Arc<AppState>>,
    Path(facility_id): Path<Uuid>,
) -> impl IntoResponse {
    let changed = st.timers.start(facility_id);
    info!(facility = %facility_id, changed, "timers/start");
    (
        StatusCode::OK,
        Json(TimerActionResponse {
            changed,
            running: st.timers.running(),
        }),
    )
}

pub(crate) async fn timer_stop(
    State(st): State<Arc<AppState>>,
    Path(facility_id): Path<Uuid>,
) -> impl IntoResponse {
    let changed = st.timers.stop(facility_id);
    info!(facility = %facility_id, changed, "timers/stop");
    (
        StatusCode::OK,
        Json(TimerActionResponse {
            changed,
            running: st.timers.running(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::Event(_) => "event",
                    BusMsg::AutoMark(_) => "automark",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
