use chrono::{NaiveDate, Utc};
use ddk_audit::{AuditEntry, AuditSink};
use ddk_schemas::local::{local_hour, local_noon_utc};
use ddk_schemas::{
    Actor, AttendanceRecord, DayStatus, Direction, EventSource, LeaveApplication, LeaveStatus,
    Person, Shift,
};
use ddk_store::{Store, StoreError};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::types::{LeaveError, NewLeave};

/// Leave Coordinator over the storage ports.
///
/// No transaction spans the ledger writes and the person-state update; a
/// crash between them leaves recoverable drift, surfaced by the consistency
/// check. Audit entries are best-effort and never fail a transition.
pub struct LeaveEngine {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
}

impl LeaveEngine {
    pub fn new(store: Arc<dyn Store>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The approved application whose effective window covers `day`, if any.
    pub async fn is_on_leave(
        &self,
        person_id: Uuid,
        day: NaiveDate,
    ) -> Result<Option<LeaveApplication>, LeaveError> {
        Ok(self.store.active_leave(person_id, day).await?)
    }

    /// Every person of the facility effectively on leave for `day`, keyed by
    /// person. Feeds the auto-mark sweep.
    pub async fn on_leave_set(
        &self,
        facility_id: Uuid,
        day: NaiveDate,
    ) -> Result<HashMap<Uuid, LeaveApplication>, LeaveError> {
        let apps = self.store.approved_for_day(facility_id, day).await?;
        let mut by_person = HashMap::new();
        for app in apps {
            by_person.entry(app.person_id).or_insert(app);
        }
        Ok(by_person)
    }

    // -----------------------------------------------------------------------
    // create
    // -----------------------------------------------------------------------

    pub async fn create(&self, req: NewLeave) -> Result<LeaveApplication, LeaveError> {
        if req.from_day > req.to_day {
            return Err(LeaveError::ValidationFailure(format!(
                "from_day {} is after to_day {}",
                req.from_day, req.to_day
            )));
        }
        if req.reason.trim().is_empty() {
            return Err(LeaveError::ValidationFailure(
                "a reason is required".to_string(),
            ));
        }

        let person = self.person(req.person_id).await?;

        let clashing = self
            .store
            .overlapping(req.person_id, req.from_day, req.to_day)
            .await?;
        if let Some(existing) = clashing.into_iter().next() {
            return Err(LeaveError::OverlappingLeave { existing });
        }

        let now = Utc::now();
        let app = LeaveApplication {
            leave_id: Uuid::new_v4(),
            person_id: req.person_id,
            facility_id: person.facility_id,
            from_day: req.from_day,
            to_day: req.to_day,
            status: LeaveStatus::Pending,
            reason: req.reason,
            requested_by: req.requested_by.name.clone(),
            decided_by: None,
            decision_reason: None,
            early_return: false,
            actual_return_day: None,
            attendance_created: false,
            created_at: now,
            updated_at: now,
        };
        self.store.create(app.clone()).await?;

        self.audit.log(
            AuditEntry::new(
                "leave",
                app.leave_id.to_string(),
                "create",
                json!({
                    "person_id": app.person_id,
                    "from_day": app.from_day,
                    "to_day": app.to_day,
                }),
                &req.requested_by.name,
            )
            .facility(app.facility_id)
            .reason(&app.reason),
        );
        Ok(app)
    }

    // -----------------------------------------------------------------------
    // approve
    // -----------------------------------------------------------------------

    /// `pending` → `approved`: materializes one leave-sourced day-end record
    /// per day of the range and forces the person's state OUT.
    pub async fn approve(
        &self,
        leave_id: Uuid,
        actor: &Actor,
    ) -> Result<LeaveApplication, LeaveError> {
        let mut app = self.application(leave_id).await?;
        require_status(&app, LeaveStatus::Pending, "approve")?;

        let created = self.materialize_records(&app).await?;

        let now = Utc::now();
        app.status = LeaveStatus::Approved;
        app.decided_by = Some(actor.name.clone());
        app.attendance_created = true;
        app.updated_at = now;
        self.store.update(app.clone()).await?;

        self.store
            .update_state(app.person_id, Direction::Out, now)
            .await?;

        self.audit.log(
            AuditEntry::new(
                "leave",
                app.leave_id.to_string(),
                "approve",
                json!({ "records_created": created }),
                &actor.name,
            )
            .facility(app.facility_id),
        );
        Ok(app)
    }

    // -----------------------------------------------------------------------
    // reject
    // -----------------------------------------------------------------------

    /// `pending` → `rejected`: requires a reason; removes any leave-sourced
    /// records already present and restores state IN.
    pub async fn reject(
        &self,
        leave_id: Uuid,
        actor: &Actor,
        reason: &str,
    ) -> Result<LeaveApplication, LeaveError> {
        if reason.trim().is_empty() {
            return Err(LeaveError::ValidationFailure(
                "rejection requires a reason".to_string(),
            ));
        }
        let mut app = self.application(leave_id).await?;
        require_status(&app, LeaveStatus::Pending, "reject")?;

        let now = Utc::now();
        let removed = self
            .store
            .soft_delete_by_source(
                app.person_id,
                EventSource::Leave,
                app.from_day,
                app.to_day,
                &actor.name,
                now,
            )
            .await?;

        app.status = LeaveStatus::Rejected;
        app.decided_by = Some(actor.name.clone());
        app.decision_reason = Some(reason.to_string());
        app.updated_at = now;
        self.store.update(app.clone()).await?;

        self.store
            .update_state(app.person_id, Direction::In, now)
            .await?;

        self.audit.log(
            AuditEntry::new(
                "leave",
                app.leave_id.to_string(),
                "reject",
                json!({ "records_removed": removed }),
                &actor.name,
            )
            .facility(app.facility_id)
            .reason(reason),
        );
        Ok(app)
    }

    // -----------------------------------------------------------------------
    // cancel
    // -----------------------------------------------------------------------

    /// `approved` → `cancelled`: creator-or-admin only; removes the generated
    /// records and restores state IN.
    pub async fn cancel(
        &self,
        leave_id: Uuid,
        actor: &Actor,
    ) -> Result<LeaveApplication, LeaveError> {
        let mut app = self.application(leave_id).await?;
        require_status(&app, LeaveStatus::Approved, "cancel")?;
        if !actor.admin && actor.name != app.requested_by {
            return Err(LeaveError::Forbidden {
                actor: actor.name.clone(),
            });
        }

        let now = Utc::now();
        let mut removed = 0;
        if app.attendance_created {
            removed = self
                .store
                .soft_delete_by_source(
                    app.person_id,
                    EventSource::Leave,
                    app.from_day,
                    app.to_day,
                    &actor.name,
                    now,
                )
                .await?;
            self.store
                .update_state(app.person_id, Direction::In, now)
                .await?;
        }

        app.status = LeaveStatus::Cancelled;
        app.decided_by = Some(actor.name.clone());
        app.updated_at = now;
        self.store.update(app.clone()).await?;

        self.audit.log(
            AuditEntry::new(
                "leave",
                app.leave_id.to_string(),
                "cancel",
                json!({ "records_removed": removed }),
                &actor.name,
            )
            .facility(app.facility_id),
        );
        Ok(app)
    }

    // -----------------------------------------------------------------------
    // early return
    // -----------------------------------------------------------------------

    /// Person came back on `day`, before the leave ran out: removes the
    /// leave-sourced records from `day` onward (the return day becomes a
    /// normal attendance day) and restores state IN. The application stays
    /// `approved` with the early-return marker set.
    pub async fn early_return(
        &self,
        leave_id: Uuid,
        day: NaiveDate,
        actor: &Actor,
    ) -> Result<LeaveApplication, LeaveError> {
        let mut app = self.application(leave_id).await?;
        require_status(&app, LeaveStatus::Approved, "early-return")?;
        if day < app.from_day || day > app.to_day {
            return Err(LeaveError::ValidationFailure(format!(
                "return day {} is outside the leave range {} to {}",
                day, app.from_day, app.to_day
            )));
        }

        let now = Utc::now();
        let removed = self
            .store
            .soft_delete_by_source(
                app.person_id,
                EventSource::Leave,
                day,
                app.to_day,
                &actor.name,
                now,
            )
            .await?;

        app.early_return = true;
        app.actual_return_day = Some(day);
        app.updated_at = now;
        self.store.update(app.clone()).await?;

        self.store
            .update_state(app.person_id, Direction::In, now)
            .await?;

        self.audit.log(
            AuditEntry::new(
                "leave",
                app.leave_id.to_string(),
                "early_return",
                json!({ "return_day": day, "records_removed": removed }),
                &actor.name,
            )
            .facility(app.facility_id),
        );
        Ok(app)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn application(&self, leave_id: Uuid) -> Result<LeaveApplication, LeaveError> {
        self.store
            .leave(leave_id)
            .await?
            .ok_or(LeaveError::NotFound(leave_id))
    }

    async fn person(&self, person_id: Uuid) -> Result<Person, LeaveError> {
        match self.store.person(person_id).await? {
            Some(p) if p.active => Ok(p),
            _ => Err(LeaveError::NotFound(person_id)),
        }
    }

    /// One day-end record per day in `[from_day, to_day]`, timestamped at
    /// facility-local noon. Days that already carry a live record are left
    /// alone so a leave source never coexists with a scan. Returns the
    /// number of records written.
    async fn materialize_records(&self, app: &LeaveApplication) -> Result<u64, LeaveError> {
        let policy = self.store.policy(app.facility_id).await?;
        let mut created = 0u64;
        let mut day = app.from_day;
        loop {
            let ts = local_noon_utc(day, policy.tz);
            let record = AttendanceRecord {
                record_id: Uuid::new_v4(),
                person_id: app.person_id,
                facility_id: app.facility_id,
                day,
                direction: Direction::Out,
                ts_utc: ts,
                source: EventSource::Leave,
                shift: Shift::from_local_hour(local_hour(ts, policy.tz)),
                status: DayStatus::OnLeave,
                reconciled: true,
                issues: vec![],
                note: None,
                reconciled_by: None,
                reconciled_at: None,
                deleted_by: None,
                deleted_at: None,
            };
            match self.store.insert_if_day_unmarked(record).await? {
                ddk_store::DayEndWrite::Inserted => created += 1,
                ddk_store::DayEndWrite::AlreadyMarked => {
                    tracing::debug!(person = %app.person_id, %day, "day already marked; leave record skipped");
                }
            }
            if day >= app.to_day {
                break;
            }
            day = day.succ_opt().ok_or_else(|| {
                LeaveError::Backend(StoreError::Backend("date overflow".to_string()))
            })?;
        }
        Ok(created)
    }
}

fn require_status(
    app: &LeaveApplication,
    expected: LeaveStatus,
    action: &'static str,
) -> Result<(), LeaveError> {
    if app.status != expected {
        return Err(LeaveError::InvalidStateTransition {
            from: app.status,
            action,
        });
    }
    Ok(())
}
