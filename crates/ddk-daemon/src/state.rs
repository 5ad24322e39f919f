//! Shared runtime state for ddk-daemon.
//!
//! One `AppState` behind an `Arc` holds every engine plus the event bus;
//! handlers get it through Axum's `State` extractor. Nothing here runs
//! async work of its own apart from the spawned heartbeat.

use std::sync::Arc;
use std::time::Duration;

use ddk_audit::AuditSink;
use ddk_automark::{AutoMarkEngine, TimerSupervisor};
use ddk_config::{DaemonSettings, ValidatorSettings};
use ddk_ingest::IngestEngine;
use ddk_leave::LeaveEngine;
use ddk_reconcile::ReconcileEngine;
use ddk_schemas::{AutoMarkSummary, EventNotice};
use ddk_store::{NotifySink, Store};
use ddk_validate::ValidatorConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// BusMsg — SSE event bus payload
// ---------------------------------------------------------------------------

/// What travels over the internal bus and out to SSE subscribers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    /// A ledger write went through; mirrors the [`NotifySink`] signal.
    Event(EventNotice),
    /// An auto-mark sweep finished (manual trigger or timer).
    AutoMark(AutoMarkSummary),
    LogLine { level: String, msg: String },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// BusNotify
// ---------------------------------------------------------------------------

/// [`NotifySink`] implementation that forwards every successful ledger write
/// onto the broadcast bus, where SSE subscribers pick it up. Send failures
/// mean "no subscribers" and are ignored.
pub struct BusNotify {
    bus: broadcast::Sender<BusMsg>,
}

impl BusNotify {
    pub fn new(bus: broadcast::Sender<BusMsg>) -> Self {
        Self { bus }
    }
}

impl NotifySink for BusNotify {
    fn notify(&self, notice: &EventNotice) {
        let _ = self.bus.send(BusMsg::Event(notice.clone()));
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers. Owns one instance
/// of each engine, all wired to the same store and audit sink.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    /// "memory" or "postgres"; surfaced in GET /v1/status.
    pub backend: &'static str,
    pub store: Arc<dyn Store>,
    pub audit: Arc<dyn AuditSink>,
    pub ingest: Arc<IngestEngine>,
    pub leave: Arc<LeaveEngine>,
    pub automark: Arc<AutoMarkEngine>,
    pub reconcile: Arc<ReconcileEngine>,
    pub timers: Arc<TimerSupervisor>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        audit: Arc<dyn AuditSink>,
        backend: &'static str,
        settings: &DaemonSettings,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(settings.stream_capacity);

        let notify: Arc<dyn NotifySink> = Arc::new(BusNotify::new(bus.clone()));
        let ingest = Arc::new(
            IngestEngine::new(store.clone(), audit.clone(), notify)
                .with_validator(validator_config(&settings.validator)),
        );
        let leave = Arc::new(LeaveEngine::new(store.clone(), audit.clone()));
        let automark = Arc::new(AutoMarkEngine::new(
            store.clone(),
            leave.clone(),
            audit.clone(),
        ));
        let reconcile = Arc::new(ReconcileEngine::new(store.clone(), audit.clone()));
        let timers = Arc::new(TimerSupervisor::new(automark.clone(), store.clone()));

        Self {
            bus,
            build: BuildInfo {
                service: "ddk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            backend,
            store,
            audit,
            ingest,
            leave,
            automark,
            reconcile,
            timers,
        }
    }
}

/// Configured thresholds into the validator's own config type. Field-for-field;
/// the two structs exist so ddk-config carries no engine dependency.
pub fn validator_config(s: &ValidatorSettings) -> ValidatorConfig {
    ValidatorConfig {
        duplicate_window_secs: s.duplicate_window_secs,
        short_stay_secs: s.short_stay_secs,
        excessive_entries: s.excessive_entries,
        unusual_start_hour: s.unusual_start_hour,
        unusual_end_hour: s.unusual_end_hour,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Seconds since the first caller asked; stands in for process uptime.
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Background heartbeat onto the bus every `interval`, for SSE liveness.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}
