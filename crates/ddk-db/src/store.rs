//! [`PgStore`]: the PostgreSQL implementation of the storage ports.
//!
//! Soft deletes are `deleted_at` timestamps; every read that feeds engine
//! logic filters `deleted_at is null`. The day-end conditional insert leans
//! on the partial unique index `uq_day_end_single_mark`, so two racing
//! day-end writers resolve to one insert and one skip at the database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc, Weekday};
use chrono_tz::Tz;
use ddk_schemas::{
    AttendanceRecord, AutoMarkSummary, DayStatus, Direction, EventSource, FacilityPolicy,
    LeaveApplication, LeaveStatus, Person, Shift, ValidationIssue,
};
use ddk_store::{
    DayEndWrite, LeaveStore, LedgerStore, ReconcilePatch, RosterStore, SettingsStore, StoreError,
    StoreResult,
};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Detect a Postgres unique constraint violation by index/constraint name.
fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        // Postgres unique_violation is SQLSTATE 23505; the constraint name is
        // what distinguishes the day-end guard from anything else.
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}

fn get<'r, T>(row: &'r PgRow, col: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<T, _>(col).map_err(backend)
}

fn weekday_to_num(w: Weekday) -> i16 {
    w.num_days_from_monday() as i16
}

fn weekday_from_num(n: i16) -> StoreResult<Weekday> {
    Ok(match n {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        6 => Weekday::Sun,
        other => {
            return Err(StoreError::Backend(format!(
                "invalid rest_weekday in facility_policies: {other}"
            )))
        }
    })
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn map_person(row: &PgRow) -> StoreResult<Person> {
    Ok(Person {
        person_id: get(row, "person_id")?,
        facility_id: get(row, "facility_id")?,
        display_name: get(row, "display_name")?,
        unit: get(row, "unit")?,
        active: get(row, "active")?,
        current_state: Direction::parse(&get::<String>(row, "current_state")?)
            .map_err(backend)?,
        last_state_update: get(row, "last_state_update")?,
    })
}

fn map_record(row: &PgRow) -> StoreResult<AttendanceRecord> {
    let issues: Vec<ValidationIssue> =
        serde_json::from_value(get::<Value>(row, "issues")?).map_err(backend)?;
    Ok(AttendanceRecord {
        record_id: get(row, "record_id")?,
        person_id: get(row, "person_id")?,
        facility_id: get(row, "facility_id")?,
        day: get(row, "day")?,
        direction: Direction::parse(&get::<String>(row, "direction")?).map_err(backend)?,
        ts_utc: get(row, "ts_utc")?,
        source: EventSource::parse(&get::<String>(row, "source")?).map_err(backend)?,
        shift: Shift::parse(&get::<String>(row, "shift")?).map_err(backend)?,
        status: DayStatus::parse(&get::<String>(row, "status")?).map_err(backend)?,
        reconciled: get(row, "reconciled")?,
        issues,
        note: get(row, "note")?,
        reconciled_by: get(row, "reconciled_by")?,
        reconciled_at: get(row, "reconciled_at")?,
        deleted_by: get(row, "deleted_by")?,
        deleted_at: get(row, "deleted_at")?,
    })
}

fn map_leave(row: &PgRow) -> StoreResult<LeaveApplication> {
    Ok(LeaveApplication {
        leave_id: get(row, "leave_id")?,
        person_id: get(row, "person_id")?,
        facility_id: get(row, "facility_id")?,
        from_day: get(row, "from_day")?,
        to_day: get(row, "to_day")?,
        status: LeaveStatus::parse(&get::<String>(row, "status")?).map_err(backend)?,
        reason: get(row, "reason")?,
        requested_by: get(row, "requested_by")?,
        decided_by: get(row, "decided_by")?,
        decision_reason: get(row, "decision_reason")?,
        early_return: get(row, "early_return")?,
        actual_return_day: get(row, "actual_return_day")?,
        attendance_created: get(row, "attendance_created")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn map_policy(row: &PgRow) -> StoreResult<FacilityPolicy> {
    let rest_weekday = match get::<Option<i16>>(row, "rest_weekday")? {
        Some(n) => Some(weekday_from_num(n)?),
        None => None,
    };
    let tz = get::<String>(row, "tz")?
        .parse::<Tz>()
        .map_err(backend)?;
    Ok(FacilityPolicy {
        facility_id: get(row, "facility_id")?,
        state_based_marking: get(row, "state_based_marking")?,
        auto_mark: get(row, "auto_mark")?,
        auto_mark_time: get(row, "auto_mark_time")?,
        first_entry_must_be_in: get(row, "first_entry_must_be_in")?,
        rest_weekday,
        tz,
    })
}

fn map_summary(row: &PgRow) -> StoreResult<AutoMarkSummary> {
    Ok(AutoMarkSummary {
        facility_id: get(row, "facility_id")?,
        day: get(row, "day")?,
        total: get::<i64>(row, "total")? as u64,
        already_marked: get::<i64>(row, "already_marked")? as u64,
        marked_present: get::<i64>(row, "marked_present")? as u64,
        marked_absent: get::<i64>(row, "marked_absent")? as u64,
        marked_on_leave: get::<i64>(row, "marked_on_leave")? as u64,
        errors: get::<i64>(row, "errors")? as u64,
        ran_at: get(row, "ran_at")?,
    })
}

// ---------------------------------------------------------------------------
// RosterStore
// ---------------------------------------------------------------------------

#[async_trait]
impl RosterStore for PgStore {
    async fn active_people(&self, facility_id: Uuid) -> StoreResult<Vec<Person>> {
        let rows = sqlx::query(
            r#"
            select person_id, facility_id, display_name, unit, active,
                   current_state, last_state_update
            from people
            where facility_id = $1 and active
            order by person_id
            "#,
        )
        .bind(facility_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(map_person).collect()
    }

    async fn person(&self, person_id: Uuid) -> StoreResult<Option<Person>> {
        let row = sqlx::query(
            r#"
            select person_id, facility_id, display_name, unit, active,
                   current_state, last_state_update
            from people
            where person_id = $1
            "#,
        )
        .bind(person_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(map_person).transpose()
    }

    async fn upsert_person(&self, person: Person) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into people (
              person_id, facility_id, display_name, unit, active,
              current_state, last_state_update
            ) values ($1, $2, $3, $4, $5, $6, $7)
            on conflict (person_id) do update set
              facility_id = excluded.facility_id,
              display_name = excluded.display_name,
              unit = excluded.unit,
              active = excluded.active,
              current_state = excluded.current_state,
              last_state_update = excluded.last_state_update
            "#,
        )
        .bind(person.person_id)
        .bind(person.facility_id)
        .bind(&person.display_name)
        .bind(&person.unit)
        .bind(person.active)
        .bind(person.current_state.as_str())
        .bind(person.last_state_update)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn update_state(
        &self,
        person_id: Uuid,
        direction: Direction,
        ts: DateTime<Utc>,
    ) -> StoreResult<()> {
        let res = sqlx::query(
            r#"
            update people
            set current_state = $2, last_state_update = $3
            where person_id = $1
            "#,
        )
        .bind(person_id)
        .bind(direction.as_str())
        .bind(ts)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if res.rows_affected() == 0 {
            return Err(StoreError::Missing("person", person_id));
        }
        Ok(())
    }

    async fn reset_states(&self, facility_id: Uuid, ts: DateTime<Utc>) -> StoreResult<u64> {
        let res = sqlx::query(
            r#"
            update people
            set current_state = 'IN', last_state_update = $2
            where facility_id = $1 and active
            "#,
        )
        .bind(facility_id)
        .bind(ts)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(res.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// LedgerStore
// ---------------------------------------------------------------------------

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert(&self, record: AttendanceRecord) -> StoreResult<()> {
        let issues = serde_json::to_value(&record.issues).map_err(backend)?;
        sqlx::query(
            r#"
            insert into attendance_records (
              record_id, person_id, facility_id, day, direction, ts_utc,
              source, shift, status, reconciled, issues, note,
              reconciled_by, reconciled_at, deleted_by, deleted_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16
            )
            "#,
        )
        .bind(record.record_id)
        .bind(record.person_id)
        .bind(record.facility_id)
        .bind(record.day)
        .bind(record.direction.as_str())
        .bind(record.ts_utc)
        .bind(record.source.as_str())
        .bind(record.shift.as_str())
        .bind(record.status.as_str())
        .bind(record.reconciled)
        .bind(issues)
        .bind(&record.note)
        .bind(&record.reconciled_by)
        .bind(record.reconciled_at)
        .bind(&record.deleted_by)
        .bind(record.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn day_records(
        &self,
        person_id: Uuid,
        day: NaiveDate,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let rows = sqlx::query(
            r#"
            select record_id, person_id, facility_id, day, direction, ts_utc,
                   source, shift, status, reconciled, issues, note,
                   reconciled_by, reconciled_at, deleted_by, deleted_at
            from attendance_records
            where person_id = $1 and day = $2 and deleted_at is null
            order by ts_utc, record_id
            "#,
        )
        .bind(person_id)
        .bind(day)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(map_record).collect()
    }

    async fn insert_if_day_unmarked(&self, record: AttendanceRecord) -> StoreResult<DayEndWrite> {
        let issues = serde_json::to_value(&record.issues).map_err(backend)?;
        // The NOT EXISTS guard handles the common case; the partial unique
        // index closes the race between two concurrent day-end writers.
        let res = sqlx::query(
            r#"
            insert into attendance_records (
              record_id, person_id, facility_id, day, direction, ts_utc,
              source, shift, status, reconciled, issues, note,
              reconciled_by, reconciled_at, deleted_by, deleted_at
            )
            select $1::uuid, $2::uuid, $3::uuid, $4::date, $5::text, $6::timestamptz,
                   $7::text, $8::text, $9::text, $10::boolean, $11::jsonb, $12::text,
                   $13::text, $14::timestamptz, $15::text, $16::timestamptz
            where not exists (
              select 1 from attendance_records
              where person_id = $2 and day = $4 and deleted_at is null
            )
            "#,
        )
        .bind(record.record_id)
        .bind(record.person_id)
        .bind(record.facility_id)
        .bind(record.day)
        .bind(record.direction.as_str())
        .bind(record.ts_utc)
        .bind(record.source.as_str())
        .bind(record.shift.as_str())
        .bind(record.status.as_str())
        .bind(record.reconciled)
        .bind(issues)
        .bind(&record.note)
        .bind(&record.reconciled_by)
        .bind(record.reconciled_at)
        .bind(&record.deleted_by)
        .bind(record.deleted_at)
        .execute(&self.pool)
        .await;

        match res {
            Ok(done) if done.rows_affected() == 1 => Ok(DayEndWrite::Inserted),
            Ok(_) => Ok(DayEndWrite::AlreadyMarked),
            Err(e) if is_unique_violation(&e, "uq_day_end_single_mark") => {
                Ok(DayEndWrite::AlreadyMarked)
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn record(&self, record_id: Uuid) -> StoreResult<Option<AttendanceRecord>> {
        let row = sqlx::query(
            r#"
            select record_id, person_id, facility_id, day, direction, ts_utc,
                   source, shift, status, reconciled, issues, note,
                   reconciled_by, reconciled_at, deleted_by, deleted_at
            from attendance_records
            where record_id = $1
            "#,
        )
        .bind(record_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(map_record).transpose()
    }

    async fn soft_delete_by_source(
        &self,
        person_id: Uuid,
        source: EventSource,
        from_day: NaiveDate,
        to_day: NaiveDate,
        actor: &str,
        ts: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let res = sqlx::query(
            r#"
            update attendance_records
            set deleted_by = $5, deleted_at = $6
            where person_id = $1 and source = $2
              and day between $3 and $4
              and deleted_at is null
            "#,
        )
        .bind(person_id)
        .bind(source.as_str())
        .bind(from_day)
        .bind(to_day)
        .bind(actor)
        .bind(ts)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(res.rows_affected())
    }

    async fn apply_reconciliation(
        &self,
        record_id: Uuid,
        patch: ReconcilePatch,
    ) -> StoreResult<AttendanceRecord> {
        let row = sqlx::query(
            r#"
            update attendance_records
            set status = coalesce($2::text, status),
                direction = coalesce($3::text, direction),
                note = coalesce($4::text, note),
                reconciled = true,
                reconciled_by = $5,
                reconciled_at = $6
            where record_id = $1 and deleted_at is null
            returning record_id, person_id, facility_id, day, direction, ts_utc,
                      source, shift, status, reconciled, issues, note,
                      reconciled_by, reconciled_at, deleted_by, deleted_at
            "#,
        )
        .bind(record_id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.direction.map(|d| d.as_str()))
        .bind(&patch.note)
        .bind(&patch.actor)
        .bind(patch.ts)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => map_record(&row),
            None => Err(StoreError::Missing("attendance record", record_id)),
        }
    }

    async fn flagged(
        &self,
        facility_id: Uuid,
        day: NaiveDate,
        unit: Option<&str>,
    ) -> StoreResult<Vec<AttendanceRecord>> {
        let rows = sqlx::query(
            r#"
            select r.record_id, r.person_id, r.facility_id, r.day, r.direction,
                   r.ts_utc, r.source, r.shift, r.status, r.reconciled, r.issues,
                   r.note, r.reconciled_by, r.reconciled_at, r.deleted_by, r.deleted_at
            from attendance_records r
            join people p on p.person_id = r.person_id
            where r.facility_id = $1 and r.day = $2 and r.deleted_at is null
              and (jsonb_array_length(r.issues) > 0 or r.status = 'unknown')
              and ($3::text is null or p.unit = $3)
            order by r.person_id, r.ts_utc, r.record_id
            "#,
        )
        .bind(facility_id)
        .bind(day)
        .bind(unit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(map_record).collect()
    }

    async fn latest_record(&self, person_id: Uuid) -> StoreResult<Option<AttendanceRecord>> {
        let row = sqlx::query(
            r#"
            select record_id, person_id, facility_id, day, direction, ts_utc,
                   source, shift, status, reconciled, issues, note,
                   reconciled_by, reconciled_at, deleted_by, deleted_at
            from attendance_records
            where person_id = $1 and deleted_at is null
            order by ts_utc desc, record_id desc
            limit 1
            "#,
        )
        .bind(person_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(map_record).transpose()
    }
}

// ---------------------------------------------------------------------------
// LeaveStore
// ---------------------------------------------------------------------------

#[async_trait]
impl LeaveStore for PgStore {
    async fn create(&self, app: LeaveApplication) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into leave_applications (
              leave_id, person_id, facility_id, from_day, to_day, status,
              reason, requested_by, decided_by, decision_reason, early_return,
              actual_return_day, attendance_created, created_at, updated_at
            ) values (
              $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15
            )
            "#,
        )
        .bind(app.leave_id)
        .bind(app.person_id)
        .bind(app.facility_id)
        .bind(app.from_day)
        .bind(app.to_day)
        .bind(app.status.as_str())
        .bind(&app.reason)
        .bind(&app.requested_by)
        .bind(&app.decided_by)
        .bind(&app.decision_reason)
        .bind(app.early_return)
        .bind(app.actual_return_day)
        .bind(app.attendance_created)
        .bind(app.created_at)
        .bind(app.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn leave(&self, leave_id: Uuid) -> StoreResult<Option<LeaveApplication>> {
        let row = sqlx::query(
            r#"
            select leave_id, person_id, facility_id, from_day, to_day, status,
                   reason, requested_by, decided_by, decision_reason, early_return,
                   actual_return_day, attendance_created, created_at, updated_at
            from leave_applications
            where leave_id = $1
            "#,
        )
        .bind(leave_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(map_leave).transpose()
    }

    async fn update(&self, app: LeaveApplication) -> StoreResult<()> {
        let res = sqlx::query(
            r#"
            update leave_applications
            set from_day = $2, to_day = $3, status = $4, reason = $5,
                requested_by = $6, decided_by = $7, decision_reason = $8,
                early_return = $9, actual_return_day = $10,
                attendance_created = $11, updated_at = $12
            where leave_id = $1
            "#,
        )
        .bind(app.leave_id)
        .bind(app.from_day)
        .bind(app.to_day)
        .bind(app.status.as_str())
        .bind(&app.reason)
        .bind(&app.requested_by)
        .bind(&app.decided_by)
        .bind(&app.decision_reason)
        .bind(app.early_return)
        .bind(app.actual_return_day)
        .bind(app.attendance_created)
        .bind(app.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if res.rows_affected() == 0 {
            return Err(StoreError::Missing("leave application", app.leave_id));
        }
        Ok(())
    }

    async fn active_leave(
        &self,
        person_id: Uuid,
        day: NaiveDate,
    ) -> StoreResult<Option<LeaveApplication>> {
        // Effective-window predicate: early return shortens the window and
        // frees the return day itself.
        let row = sqlx::query(
            r#"
            select leave_id, person_id, facility_id, from_day, to_day, status,
                   reason, requested_by, decided_by, decision_reason, early_return,
                   actual_return_day, attendance_created, created_at, updated_at
            from leave_applications
            where person_id = $1 and status = 'approved'
              and from_day <= $2
              and case when early_return and actual_return_day is not null
                       then $2 < actual_return_day
                       else $2 <= to_day
                  end
            order by from_day, leave_id
            limit 1
            "#,
        )
        .bind(person_id)
        .bind(day)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(map_leave).transpose()
    }

    async fn approved_for_day(
        &self,
        facility_id: Uuid,
        day: NaiveDate,
    ) -> StoreResult<Vec<LeaveApplication>> {
        let rows = sqlx::query(
            r#"
            select leave_id, person_id, facility_id, from_day, to_day, status,
                   reason, requested_by, decided_by, decision_reason, early_return,
                   actual_return_day, attendance_created, created_at, updated_at
            from leave_applications
            where facility_id = $1 and status = 'approved'
              and from_day <= $2
              and case when early_return and actual_return_day is not null
                       then $2 < actual_return_day
                       else $2 <= to_day
                  end
            order by from_day, leave_id
            "#,
        )
        .bind(facility_id)
        .bind(day)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(map_leave).collect()
    }

    async fn overlapping(
        &self,
        person_id: Uuid,
        from_day: NaiveDate,
        to_day: NaiveDate,
    ) -> StoreResult<Vec<LeaveApplication>> {
        let rows = sqlx::query(
            r#"
            select leave_id, person_id, facility_id, from_day, to_day, status,
                   reason, requested_by, decided_by, decision_reason, early_return,
                   actual_return_day, attendance_created, created_at, updated_at
            from leave_applications
            where person_id = $1 and status in ('pending', 'approved')
              and from_day <= $3 and $2 <= to_day
            order by from_day, leave_id
            "#,
        )
        .bind(person_id)
        .bind(from_day)
        .bind(to_day)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(map_leave).collect()
    }
}

// ---------------------------------------------------------------------------
// SettingsStore
// ---------------------------------------------------------------------------

#[async_trait]
impl SettingsStore for PgStore {
    async fn policy(&self, facility_id: Uuid) -> StoreResult<FacilityPolicy> {
        let row = sqlx::query(
            r#"
            select facility_id, state_based_marking, auto_mark, auto_mark_time,
                   first_entry_must_be_in, rest_weekday, tz
            from facility_policies
            where facility_id = $1
            "#,
        )
        .bind(facility_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            Some(row) => map_policy(&row),
            None => Ok(FacilityPolicy::defaults(facility_id)),
        }
    }

    async fn put_policy(&self, policy: FacilityPolicy) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into facility_policies (
              facility_id, state_based_marking, auto_mark, auto_mark_time,
              first_entry_must_be_in, rest_weekday, tz
            ) values ($1, $2, $3, $4, $5, $6, $7)
            on conflict (facility_id) do update set
              state_based_marking = excluded.state_based_marking,
              auto_mark = excluded.auto_mark,
              auto_mark_time = excluded.auto_mark_time,
              first_entry_must_be_in = excluded.first_entry_must_be_in,
              rest_weekday = excluded.rest_weekday,
              tz = excluded.tz
            "#,
        )
        .bind(policy.facility_id)
        .bind(policy.state_based_marking)
        .bind(policy.auto_mark)
        .bind(policy.auto_mark_time)
        .bind(policy.first_entry_must_be_in)
        .bind(policy.rest_weekday.map(weekday_to_num))
        .bind(policy.tz.name())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn facilities(&self) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            select facility_id from facility_policies order by facility_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(|row| get(row, "facility_id")).collect()
    }

    async fn record_run_summary(&self, summary: AutoMarkSummary) -> StoreResult<()> {
        sqlx::query(
            r#"
            insert into automark_runs (
              facility_id, day, total, already_marked, marked_present,
              marked_absent, marked_on_leave, errors, ran_at
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(summary.facility_id)
        .bind(summary.day)
        .bind(summary.total as i64)
        .bind(summary.already_marked as i64)
        .bind(summary.marked_present as i64)
        .bind(summary.marked_absent as i64)
        .bind(summary.marked_on_leave as i64)
        .bind(summary.errors as i64)
        .bind(summary.ran_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn last_run_summary(
        &self,
        facility_id: Uuid,
    ) -> StoreResult<Option<AutoMarkSummary>> {
        let row = sqlx::query(
            r#"
            select facility_id, day, total, already_marked, marked_present,
                   marked_absent, marked_on_leave, errors, ran_at
            from automark_runs
            where facility_id = $1
            order by ran_at desc, id desc
            limit 1
            "#,
        )
        .bind(facility_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.as_ref().map(map_summary).transpose()
    }
}
