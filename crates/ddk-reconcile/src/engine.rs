use chrono::{NaiveDate, Utc};
use ddk_audit::{AuditEntry, AuditSink};
use ddk_schemas::{Actor, DayStatus, Severity};
use ddk_store::{ReconcilePatch, Store};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::types::{
    ApproveAllOutcome, DriftEntry, QueueCounts, ReconcileError, ReconcileQueue, RecordEdit,
};

pub struct ReconcileEngine {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
}

impl ReconcileEngine {
    pub fn new(store: Arc<dyn Store>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Flagged records of one facility/date, optionally narrowed to a unit,
    /// with triage counts. Order is (person, timestamp), stable across calls.
    pub async fn queue(
        &self,
        facility_id: Uuid,
        day: NaiveDate,
        unit: Option<&str>,
    ) -> Result<ReconcileQueue, ReconcileError> {
        let records = self.store.flagged(facility_id, day, unit).await?;
        let mut counts = QueueCounts {
            total: records.len() as u64,
            ..QueueCounts::default()
        };
        for record in &records {
            if record.issues.iter().any(|i| i.severity == Severity::Info) {
                counts.info += 1;
            }
            if record.issues.iter().any(|i| i.severity == Severity::Warning) {
                counts.warning += 1;
            }
            if record.has_error_issue() {
                counts.error += 1;
            }
            if record.status == DayStatus::Unknown {
                counts.unknown_status += 1;
            }
            if !record.reconciled {
                counts.unreconciled += 1;
            }
        }
        Ok(ReconcileQueue { records, counts })
    }

    /// Operator settles one record: optional status/direction/note edits, and
    /// the record comes out reconciled with attribution.
    pub async fn reconcile_record(
        &self,
        record_id: Uuid,
        edit: RecordEdit,
        actor: &Actor,
    ) -> Result<ddk_schemas::AttendanceRecord, ReconcileError> {
        let now = Utc::now();
        let record = self
            .store
            .apply_reconciliation(
                record_id,
                ReconcilePatch {
                    status: edit.status,
                    direction: edit.direction,
                    note: edit.note.clone(),
                    actor: actor.name.clone(),
                    ts: now,
                },
            )
            .await?;

        self.audit.log(
            AuditEntry::new(
                "attendance",
                record_id.to_string(),
                "reconcile",
                json!({
                    "status": edit.status.map(|s| s.as_str()),
                    "direction": edit.direction.map(|d| d.as_str()),
                    "note": edit.note,
                }),
                &actor.name,
            )
            .facility(record.facility_id),
        );
        Ok(record)
    }

    /// Reconciles every queued record that carries no error-severity issue.
    /// Error-carrying records stay for individual handling.
    pub async fn approve_all(
        &self,
        facility_id: Uuid,
        day: NaiveDate,
        unit: Option<&str>,
        actor: &Actor,
    ) -> Result<ApproveAllOutcome, ReconcileError> {
        let records = self.store.flagged(facility_id, day, unit).await?;
        let now = Utc::now();
        let mut outcome = ApproveAllOutcome {
            approved: 0,
            excluded: 0,
        };
        for record in records {
            if record.has_error_issue() {
                outcome.excluded += 1;
                continue;
            }
            self.store
                .apply_reconciliation(
                    record.record_id,
                    ReconcilePatch::approve_only(actor.name.clone(), now),
                )
                .await?;
            outcome.approved += 1;
        }

        self.audit.log(
            AuditEntry::new(
                "attendance",
                day.to_string(),
                "approve_all",
                json!({
                    "day": day,
                    "unit": unit,
                    "approved": outcome.approved,
                    "excluded": outcome.excluded,
                }),
                &actor.name,
            )
            .facility(facility_id),
        );
        tracing::info!(
            facility = %facility_id,
            %day,
            approved = outcome.approved,
            excluded = outcome.excluded,
            "bulk approval finished"
        );
        Ok(outcome)
    }

    /// Reports every active person whose cached state disagrees with the
    /// direction of their most recent non-deleted record. People without any
    /// ledger history are not drift. Read-only.
    pub async fn check_state_consistency(
        &self,
        facility_id: Uuid,
    ) -> Result<Vec<DriftEntry>, ReconcileError> {
        let mut drifted = Vec::new();
        for person in self.store.active_people(facility_id).await? {
            let Some(latest) = self.store.latest_record(person.person_id).await? else {
                continue;
            };
            if latest.direction != person.current_state {
                drifted.push(DriftEntry {
                    person_id: person.person_id,
                    display_name: person.display_name.clone(),
                    current_state: person.current_state,
                    last_ledger_direction: latest.direction,
                    last_ledger_ts: latest.ts_utc,
                });
            }
        }
        Ok(drifted)
    }

    /// Bulk repair: every active person's cached state back to IN. Returns
    /// the number of people touched.
    pub async fn reset_all_states(
        &self,
        facility_id: Uuid,
        actor: &Actor,
    ) -> Result<u64, ReconcileError> {
        let now = Utc::now();
        let touched = self.store.reset_states(facility_id, now).await?;
        self.audit.log(
            AuditEntry::new(
                "person",
                facility_id.to_string(),
                "reset_states",
                json!({ "touched": touched }),
                &actor.name,
            )
            .facility(facility_id),
        );
        tracing::info!(facility = %facility_id, touched, "state reset finished");
        Ok(touched)
    }
}
