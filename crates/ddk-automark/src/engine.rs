use chrono::{NaiveDate, Utc};
use ddk_audit::{AuditEntry, AuditSink};
use ddk_leave::{LeaveEngine, LeaveError};
use ddk_schemas::local::{local_hour, local_time_utc};
use ddk_schemas::{
    AttendanceRecord, AutoMarkSummary, DayStatus, Direction, EventSource, FacilityPolicy, Person,
    Shift,
};
use ddk_store::{DayEndWrite, Store, StoreError};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
pub enum AutoMarkError {
    Backend(StoreError),
}

impl std::fmt::Display for AutoMarkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutoMarkError::Backend(err) => write!(f, "auto-mark storage failure: {err}"),
        }
    }
}

impl std::error::Error for AutoMarkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AutoMarkError::Backend(err) => Some(err),
        }
    }
}

impl From<StoreError> for AutoMarkError {
    fn from(err: StoreError) -> Self {
        AutoMarkError::Backend(err)
    }
}

impl From<LeaveError> for AutoMarkError {
    fn from(err: LeaveError) -> Self {
        match err {
            LeaveError::Backend(inner) => AutoMarkError::Backend(inner),
            other => AutoMarkError::Backend(StoreError::Backend(other.to_string())),
        }
    }
}

pub struct AutoMarkEngine {
    store: Arc<dyn Store>,
    leave: Arc<LeaveEngine>,
    audit: Arc<dyn AuditSink>,
}

impl AutoMarkEngine {
    pub fn new(store: Arc<dyn Store>, leave: Arc<LeaveEngine>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            leave,
            audit,
        }
    }

    /// One sweep over the facility's active roster for `day`. Always returns
    /// a summary; per-person failures are counted, never raised. The summary
    /// of a real run is persisted to the settings write-back slot.
    pub async fn mark_for_date(
        &self,
        facility_id: Uuid,
        day: NaiveDate,
    ) -> Result<AutoMarkSummary, AutoMarkError> {
        let ran_at = Utc::now();
        let policy = self.store.policy(facility_id).await?;
        if !policy.state_based_marking {
            tracing::info!(facility = %facility_id, %day, "state-based marking disabled; nothing to do");
            return Ok(AutoMarkSummary::zero(facility_id, day, ran_at));
        }

        let on_leave = self.leave.on_leave_set(facility_id, day).await?;
        let roster = self.store.active_people(facility_id).await?;

        let mut summary = AutoMarkSummary::zero(facility_id, day, ran_at);
        summary.total = roster.len() as u64;
        for person in &roster {
            let verdict = if on_leave.contains_key(&person.person_id) {
                DayStatus::OnLeave
            } else {
                match person.current_state {
                    Direction::In => DayStatus::Present,
                    Direction::Out => DayStatus::Absent,
                }
            };
            match self.mark_person(person, &policy, day, verdict).await {
                Ok(DayEndWrite::AlreadyMarked) => summary.already_marked += 1,
                Ok(DayEndWrite::Inserted) => match verdict {
                    DayStatus::Present => summary.marked_present += 1,
                    DayStatus::Absent => summary.marked_absent += 1,
                    _ => summary.marked_on_leave += 1,
                },
                Err(err) => {
                    summary.errors += 1;
                    tracing::warn!(
                        person = %person.person_id,
                        %day,
                        %err,
                        "auto-mark failed for person; run continues"
                    );
                }
            }
        }

        self.store.record_run_summary(summary.clone()).await?;
        self.audit.log(
            AuditEntry::new(
                "automark",
                day.to_string(),
                "run",
                json!({
                    "day": day,
                    "total": summary.total,
                    "already_marked": summary.already_marked,
                    "marked_present": summary.marked_present,
                    "marked_absent": summary.marked_absent,
                    "marked_on_leave": summary.marked_on_leave,
                    "errors": summary.errors,
                }),
                "automark",
            )
            .facility(facility_id),
        );
        tracing::info!(
            facility = %facility_id,
            %day,
            total = summary.total,
            already = summary.already_marked,
            present = summary.marked_present,
            absent = summary.marked_absent,
            on_leave = summary.marked_on_leave,
            errors = summary.errors,
            "auto-mark run finished"
        );
        Ok(summary)
    }

    /// Backfill: one sweep per day of the inclusive range, in date order.
    pub async fn mark_for_range(
        &self,
        facility_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AutoMarkSummary>, AutoMarkError> {
        let mut summaries = Vec::new();
        let mut day = from;
        while day <= to {
            summaries.push(self.mark_for_date(facility_id, day).await?);
            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        Ok(summaries)
    }

    /// Day-end write for one person. The existence check lives inside the
    /// store op, so a record that raced in first turns this into a skip.
    async fn mark_person(
        &self,
        person: &Person,
        policy: &FacilityPolicy,
        day: NaiveDate,
        verdict: DayStatus,
    ) -> Result<DayEndWrite, StoreError> {
        let direction = match verdict {
            DayStatus::Present => Direction::In,
            _ => Direction::Out,
        };
        let ts = local_time_utc(day, policy.auto_mark_time, policy.tz);
        let record = AttendanceRecord {
            record_id: Uuid::new_v4(),
            person_id: person.person_id,
            facility_id: person.facility_id,
            day,
            direction,
            ts_utc: ts,
            source: EventSource::Auto,
            shift: Shift::from_local_hour(local_hour(ts, policy.tz)),
            status: verdict,
            reconciled: true,
            issues: vec![],
            note: None,
            reconciled_by: None,
            reconciled_at: None,
            deleted_by: None,
            deleted_at: None,
        };
        let written = self.store.insert_if_day_unmarked(record).await?;
        if written == DayEndWrite::Inserted {
            self.store.update_state(person.person_id, direction, ts).await?;
        }
        Ok(written)
    }
}
