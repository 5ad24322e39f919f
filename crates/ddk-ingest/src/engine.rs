use ddk_audit::{AuditEntry, AuditSink};
use ddk_schemas::local::{local_day, local_hour, local_noon_utc};
use ddk_schemas::{
    AttendanceRecord, DayStatus, Direction, EventNotice, EventSource, Person, Shift,
};
use ddk_store::{NotifySink, Store};
use ddk_validate::{auto_reconciled, validate, ValidatorConfig};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::types::{
    BulkOutcome, BulkRequest, BulkRowError, EventInput, IngestError, IngestOutcome,
};

pub struct IngestEngine {
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    notify: Arc<dyn NotifySink>,
    validator: ValidatorConfig,
}

impl IngestEngine {
    pub fn new(
        store: Arc<dyn Store>,
        audit: Arc<dyn AuditSink>,
        notify: Arc<dyn NotifySink>,
    ) -> Self {
        Self {
            store,
            audit,
            notify,
            validator: ValidatorConfig::default(),
        }
    }

    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }

    /// Runs the full pipeline for one event: resolve the person, settle the
    /// direction, clear the leave gate, validate, write, update state, then
    /// fire the best-effort side effects.
    pub async fn ingest(&self, input: EventInput) -> Result<IngestOutcome, IngestError> {
        let person = self.person(input.person_id).await?;
        if person.facility_id != input.facility_id {
            return Err(IngestError::WrongFacility {
                person_id: person.person_id,
                facility_id: person.facility_id,
            });
        }

        let policy = self.store.policy(person.facility_id).await?;
        let day = local_day(input.ts_utc, policy.tz);
        let actor = input
            .recorded_by
            .clone()
            .unwrap_or_else(|| input.source.as_str().to_string());

        if let Some(leave) = self.store.active_leave(person.person_id, day).await? {
            match input.override_leave_id {
                None => return Err(IngestError::OnLeaveConflict { leave }),
                Some(leave_id) => {
                    // The day's generated record goes first so leave and scan
                    // sources never coexist on one date.
                    let removed = self
                        .store
                        .soft_delete_by_source(
                            person.person_id,
                            EventSource::Leave,
                            day,
                            day,
                            &actor,
                            input.ts_utc,
                        )
                        .await?;
                    tracing::info!(
                        person = %person.person_id,
                        %day,
                        %leave_id,
                        removed,
                        "leave overridden; event proceeds"
                    );
                }
            }
        }

        let prior = self.store.day_records(person.person_id, day).await?;
        let applied = match input.direction {
            Some(direction) => {
                if policy.first_entry_must_be_in
                    && direction == Direction::Out
                    && prior.is_empty()
                {
                    return Err(IngestError::ValidationFailure(
                        "first event of a fresh day must be IN".to_string(),
                    ));
                }
                direction
            }
            None => prior
                .last()
                .map(|r| r.direction.toggled())
                .unwrap_or(Direction::In),
        };

        let issues = validate(&self.validator, &policy, applied, input.ts_utc, &prior);
        let status = input.status.unwrap_or(match applied {
            Direction::In => DayStatus::Present,
            Direction::Out => DayStatus::LeftEarly,
        });

        let record = AttendanceRecord {
            record_id: Uuid::new_v4(),
            person_id: person.person_id,
            facility_id: person.facility_id,
            day,
            direction: applied,
            ts_utc: input.ts_utc,
            source: input.source,
            shift: Shift::from_local_hour(local_hour(input.ts_utc, policy.tz)),
            status,
            reconciled: auto_reconciled(&issues),
            issues: issues.clone(),
            note: input.note,
            reconciled_by: None,
            reconciled_at: None,
            deleted_by: None,
            deleted_at: None,
        };
        self.store.insert(record.clone()).await?;
        self.store
            .update_state(person.person_id, applied, input.ts_utc)
            .await?;

        self.audit.log(
            AuditEntry::new(
                "attendance",
                record.record_id.to_string(),
                "ingest",
                json!({
                    "person_id": person.person_id,
                    "day": day,
                    "direction": applied.as_str(),
                    "source": input.source.as_str(),
                    "device_id": input.device_id,
                    "override_leave_id": input.override_leave_id,
                    "issues": issues.len(),
                }),
                &actor,
            )
            .facility(person.facility_id),
        );
        self.notify.notify(&EventNotice {
            facility_id: person.facility_id,
            person_id: person.person_id,
            direction: applied,
            status,
            source: input.source,
            ts_utc: input.ts_utc,
        });

        Ok(IngestOutcome {
            record,
            applied,
            issues,
        })
    }

    /// Runs the single-event pipeline once per row, timestamped at the
    /// marked date's facility-local noon. Rows fail independently.
    pub async fn ingest_bulk(&self, req: BulkRequest) -> Result<BulkOutcome, IngestError> {
        let policy = self.store.policy(req.facility_id).await?;
        let ts = local_noon_utc(req.day, policy.tz);

        let mut out = BulkOutcome::default();
        for row in req.rows {
            let input = EventInput {
                person_id: row.person_id,
                facility_id: req.facility_id,
                ts_utc: ts,
                direction: row.direction,
                source: EventSource::Bulk,
                status: row.status,
                device_id: None,
                note: row.note,
                override_leave_id: None,
                recorded_by: req.recorded_by.clone(),
            };
            match self.ingest(input).await {
                Ok(outcome) => out.inserted.push(outcome.record.record_id),
                Err(IngestError::OnLeaveConflict { .. }) => {
                    out.skipped_on_leave.push(row.person_id)
                }
                Err(err) => {
                    tracing::warn!(person = %row.person_id, %err, "bulk row rejected");
                    out.errors.push(BulkRowError {
                        person_id: row.person_id,
                        message: err.to_string(),
                    });
                }
            }
        }
        tracing::info!(
            facility = %req.facility_id,
            day = %req.day,
            inserted = out.inserted.len(),
            skipped = out.skipped_on_leave.len(),
            errors = out.errors.len(),
            "bulk ingest finished"
        );
        Ok(out)
    }

    async fn person(&self, person_id: Uuid) -> Result<Person, IngestError> {
        match self.store.person(person_id).await? {
            Some(p) if p.active => Ok(p),
            _ => Err(IngestError::NotFound(person_id)),
        }
    }
}
