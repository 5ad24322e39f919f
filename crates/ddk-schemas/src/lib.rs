use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub mod local;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Movement direction of one attendance event. Also doubles as the cached
/// "current state" of a person (`IN` = inside the facility).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "IN",
            Direction::Out => "OUT",
        }
    }

    /// The direction a type-omitted (biometric) scan resolves to when the
    /// last same-day record carries `self`.
    pub fn toggled(&self) -> Direction {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "IN" => Ok(Direction::In),
            "OUT" => Ok(Direction::Out),
            other => Err(anyhow!("invalid direction: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// EventSource
// ---------------------------------------------------------------------------

/// Where an attendance record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Device scan; direction is derived by toggling.
    Biometric,
    /// Operator entry with an explicit direction.
    Manual,
    /// Row of a bulk import.
    Bulk,
    /// Materialized by a leave approval.
    Leave,
    /// Written by the end-of-day auto-mark sweep.
    Auto,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Biometric => "biometric",
            EventSource::Manual => "manual",
            EventSource::Bulk => "bulk",
            EventSource::Leave => "leave",
            EventSource::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "biometric" => Ok(EventSource::Biometric),
            "manual" => Ok(EventSource::Manual),
            "bulk" => Ok(EventSource::Bulk),
            "leave" => Ok(EventSource::Leave),
            "auto" => Ok(EventSource::Auto),
            other => Err(anyhow!("invalid event source: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// DayStatus
// ---------------------------------------------------------------------------

/// Settled day verdict carried by a record. `Unknown` records always land in
/// the reconciliation queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Present,
    Absent,
    OnLeave,
    LeftEarly,
    Unknown,
}

impl DayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayStatus::Present => "present",
            DayStatus::Absent => "absent",
            DayStatus::OnLeave => "on_leave",
            DayStatus::LeftEarly => "left_early",
            DayStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "present" => Ok(DayStatus::Present),
            "absent" => Ok(DayStatus::Absent),
            "on_leave" => Ok(DayStatus::OnLeave),
            "left_early" => Ok(DayStatus::LeftEarly),
            "unknown" => Ok(DayStatus::Unknown),
            other => Err(anyhow!("invalid day status: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Shift
// ---------------------------------------------------------------------------

/// Facility-local time-of-day bucket, derived from the event hour:
/// Morning [05,12), Afternoon [12,17), Evening [17,23), Night [23,05).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl Shift {
    pub fn from_local_hour(hour: u32) -> Shift {
        match hour {
            5..=11 => Shift::Morning,
            12..=16 => Shift::Afternoon,
            17..=22 => Shift::Evening,
            _ => Shift::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Morning => "morning",
            Shift::Afternoon => "afternoon",
            Shift::Evening => "evening",
            Shift::Night => "night",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "morning" => Ok(Shift::Morning),
            "afternoon" => Ok(Shift::Afternoon),
            "evening" => Ok(Shift::Evening),
            "night" => Ok(Shift::Night),
            other => Err(anyhow!("invalid shift: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation issues
// ---------------------------------------------------------------------------

/// Severity of one validation issue. Only `Error` makes a record unreconciled;
/// `Warning` and `Info` are advisory data for the reconciliation queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Duplicate,
    ShortStay,
    MissingOut,
    MissingIn,
    ExcessiveEntries,
    UnusualTime,
    RestDay,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Duplicate => "duplicate",
            IssueKind::ShortStay => "short_stay",
            IssueKind::MissingOut => "missing_out",
            IssueKind::MissingIn => "missing_in",
            IssueKind::ExcessiveEntries => "excessive_entries",
            IssueKind::UnusualTime => "unusual_time",
            IssueKind::RestDay => "rest_day",
        }
    }
}

/// One anomaly flag attached inline to a record at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    /// Machine-readable evidence (elapsed seconds, prior count, ...).
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Operator identity attached to mutations that need attribution
/// (reconciliation, soft deletes, leave decisions).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub name: String,
    /// Admins may act on applications they did not create.
    pub admin: bool,
}

impl Actor {
    pub fn operator(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            admin: false,
        }
    }

    pub fn admin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            admin: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Person
// ---------------------------------------------------------------------------

/// Roster entry. `current_state` is a cache of the last movement, updated
/// last-writer-wins; it may drift from the ledger (crash between the two
/// writes, out-of-order ingestion). Drift is surfaced by the consistency
/// check, never silently repaired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub person_id: Uuid,
    pub facility_id: Uuid,
    pub display_name: String,
    /// Block / wing inside the facility; used by scoped reconciliation review.
    pub unit: Option<String>,
    pub active: bool,
    pub current_state: Direction,
    pub last_state_update: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// AttendanceRecord
// ---------------------------------------------------------------------------

/// One row of the attendance ledger, keyed by (person, day, timestamp).
/// Append-mostly: after creation only the reconciliation fields and the
/// soft-delete fields may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub record_id: Uuid,
    pub person_id: Uuid,
    pub facility_id: Uuid,
    /// Facility-local calendar date the event belongs to.
    pub day: NaiveDate,
    pub direction: Direction,
    pub ts_utc: DateTime<Utc>,
    pub source: EventSource,
    pub shift: Shift,
    pub status: DayStatus,
    pub reconciled: bool,
    pub issues: Vec<ValidationIssue>,
    pub note: Option<String>,
    pub reconciled_by: Option<String>,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AttendanceRecord {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// True when any inline issue carries `Severity::Error`.
    pub fn has_error_issue(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    /// True when the record belongs in the reconciliation queue.
    pub fn is_flagged(&self) -> bool {
        !self.issues.is_empty() || self.status == DayStatus::Unknown
    }
}

// ---------------------------------------------------------------------------
// LeaveApplication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
            LeaveStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(LeaveStatus::Pending),
            "approved" => Ok(LeaveStatus::Approved),
            "rejected" => Ok(LeaveStatus::Rejected),
            "cancelled" => Ok(LeaveStatus::Cancelled),
            other => Err(anyhow!("invalid leave status: {}", other)),
        }
    }
}

/// A leave request over an inclusive `[from_day, to_day]` range.
///
/// The effective window for a date `d` is:
/// `from_day <= d` AND (no early return ⇒ `d <= to_day`;
/// early return ⇒ `d < actual_return_day`) — the return date itself is a
/// normal attendance day again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveApplication {
    pub leave_id: Uuid,
    pub person_id: Uuid,
    pub facility_id: Uuid,
    pub from_day: NaiveDate,
    pub to_day: NaiveDate,
    pub status: LeaveStatus,
    pub reason: String,
    pub requested_by: String,
    pub decided_by: Option<String>,
    pub decision_reason: Option<String>,
    pub early_return: bool,
    pub actual_return_day: Option<NaiveDate>,
    /// Set when approval materialized leave-sourced ledger records.
    pub attendance_created: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeaveApplication {
    /// Effective-window membership test for one date (status is NOT part of
    /// this rule; callers filter on `Approved` where it matters).
    pub fn covers(&self, day: NaiveDate) -> bool {
        if day < self.from_day {
            return false;
        }
        match (self.early_return, self.actual_return_day) {
            (true, Some(ret)) => day < ret,
            _ => day <= self.to_day,
        }
    }

    /// True when the requested `[from, to]` range intersects this
    /// application's requested range (inclusive on both sides).
    pub fn overlaps(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.from_day <= to && from <= self.to_day
    }
}

// ---------------------------------------------------------------------------
// FacilityPolicy
// ---------------------------------------------------------------------------

/// Per-facility settings consumed by ingestion and the auto-mark sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityPolicy {
    pub facility_id: Uuid,
    /// Master switch for deriving day verdicts from the cached person state.
    /// When off, auto-mark runs return a zero-result summary.
    pub state_based_marking: bool,
    /// Whether the scheduled timer fires for this facility at all.
    pub auto_mark: bool,
    /// Facility-local fire time of the end-of-day sweep.
    pub auto_mark_time: NaiveTime,
    /// Reject an explicit OUT as the first record of a fresh day.
    pub first_entry_must_be_in: bool,
    /// Designated weekly rest day; events on it get an advisory flag.
    pub rest_weekday: Option<Weekday>,
    /// IANA timezone driving local dates, shifts and timer instants.
    pub tz: Tz,
}

impl FacilityPolicy {
    /// Policy used when a facility has no stored row yet.
    pub fn defaults(facility_id: Uuid) -> Self {
        Self {
            facility_id,
            state_based_marking: true,
            auto_mark: true,
            auto_mark_time: NaiveTime::from_hms_opt(23, 59, 0)
                .unwrap_or(NaiveTime::MIN),
            first_entry_must_be_in: false,
            rest_weekday: None,
            tz: chrono_tz::UTC,
        }
    }
}

// ---------------------------------------------------------------------------
// AutoMarkSummary
// ---------------------------------------------------------------------------

/// Per-run counters persisted for observability after every auto-mark sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMarkSummary {
    pub facility_id: Uuid,
    pub day: NaiveDate,
    pub total: u64,
    pub already_marked: u64,
    pub marked_present: u64,
    pub marked_absent: u64,
    pub marked_on_leave: u64,
    pub errors: u64,
    pub ran_at: DateTime<Utc>,
}

impl AutoMarkSummary {
    /// Summary of a run that did nothing (marking disabled for the facility).
    pub fn zero(facility_id: Uuid, day: NaiveDate, ran_at: DateTime<Utc>) -> Self {
        Self {
            facility_id,
            day,
            total: 0,
            already_marked: 0,
            marked_present: 0,
            marked_absent: 0,
            marked_on_leave: 0,
            errors: 0,
            ran_at,
        }
    }
}

// ---------------------------------------------------------------------------
// EventNotice
// ---------------------------------------------------------------------------

/// Fire-and-forget "event occurred" signal handed to the notification sink
/// after a successful ledger write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventNotice {
    pub facility_id: Uuid,
    pub person_id: Uuid,
    pub direction: Direction,
    pub status: DayStatus,
    pub source: EventSource,
    pub ts_utc: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn leave(from: NaiveDate, to: NaiveDate) -> LeaveApplication {
        LeaveApplication {
            leave_id: Uuid::new_v4(),
            person_id: Uuid::new_v4(),
            facility_id: Uuid::new_v4(),
            from_day: from,
            to_day: to,
            status: LeaveStatus::Approved,
            reason: "family".to_string(),
            requested_by: "warden".to_string(),
            decided_by: None,
            decision_reason: None,
            early_return: false,
            actual_return_day: None,
            attendance_created: false,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn toggle_flips_direction() {
        assert_eq!(Direction::In.toggled(), Direction::Out);
        assert_eq!(Direction::Out.toggled(), Direction::In);
    }

    #[test]
    fn shift_boundaries() {
        assert_eq!(Shift::from_local_hour(5), Shift::Morning);
        assert_eq!(Shift::from_local_hour(11), Shift::Morning);
        assert_eq!(Shift::from_local_hour(12), Shift::Afternoon);
        assert_eq!(Shift::from_local_hour(16), Shift::Afternoon);
        assert_eq!(Shift::from_local_hour(17), Shift::Evening);
        assert_eq!(Shift::from_local_hour(22), Shift::Evening);
        assert_eq!(Shift::from_local_hour(23), Shift::Night);
        assert_eq!(Shift::from_local_hour(0), Shift::Night);
        assert_eq!(Shift::from_local_hour(4), Shift::Night);
    }

    #[test]
    fn leave_window_covers_full_range_inclusive() {
        let app = leave(day(2024, 1, 10), day(2024, 1, 15));
        assert!(!app.covers(day(2024, 1, 9)));
        for d in 10..=15 {
            assert!(app.covers(day(2024, 1, d)), "day {d} should be covered");
        }
        assert!(!app.covers(day(2024, 1, 16)));
    }

    #[test]
    fn early_return_excludes_the_return_day() {
        let mut app = leave(day(2024, 1, 10), day(2024, 1, 15));
        app.early_return = true;
        app.actual_return_day = Some(day(2024, 1, 12));

        assert!(app.covers(day(2024, 1, 10)));
        assert!(app.covers(day(2024, 1, 11)));
        assert!(!app.covers(day(2024, 1, 12)), "return day is a normal day");
        assert!(!app.covers(day(2024, 1, 13)));
        assert!(!app.covers(day(2024, 1, 15)));
    }

    #[test]
    fn overlap_is_inclusive_on_both_edges() {
        let app = leave(day(2024, 2, 5), day(2024, 2, 10));
        assert!(app.overlaps(day(2024, 2, 10), day(2024, 2, 20)));
        assert!(app.overlaps(day(2024, 2, 1), day(2024, 2, 5)));
        assert!(app.overlaps(day(2024, 2, 6), day(2024, 2, 7)));
        assert!(!app.overlaps(day(2024, 2, 11), day(2024, 2, 20)));
        assert!(!app.overlaps(day(2024, 1, 1), day(2024, 2, 4)));
    }

    #[test]
    fn enum_round_trips() {
        for d in [Direction::In, Direction::Out] {
            assert_eq!(Direction::parse(d.as_str()).unwrap(), d);
        }
        for s in [
            EventSource::Biometric,
            EventSource::Manual,
            EventSource::Bulk,
            EventSource::Leave,
            EventSource::Auto,
        ] {
            assert_eq!(EventSource::parse(s.as_str()).unwrap(), s);
        }
        for s in [
            DayStatus::Present,
            DayStatus::Absent,
            DayStatus::OnLeave,
            DayStatus::LeftEarly,
            DayStatus::Unknown,
        ] {
            assert_eq!(DayStatus::parse(s.as_str()).unwrap(), s);
        }
        for s in [
            LeaveStatus::Pending,
            LeaveStatus::Approved,
            LeaveStatus::Rejected,
            LeaveStatus::Cancelled,
        ] {
            assert_eq!(LeaveStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(Direction::parse("SIDEWAYS").is_err());
    }

    #[test]
    fn record_flagging_rules() {
        let mut rec = AttendanceRecord {
            record_id: Uuid::new_v4(),
            person_id: Uuid::new_v4(),
            facility_id: Uuid::new_v4(),
            day: day(2024, 3, 1),
            direction: Direction::In,
            ts_utc: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            source: EventSource::Biometric,
            shift: Shift::Morning,
            status: DayStatus::Present,
            reconciled: true,
            issues: vec![],
            note: None,
            reconciled_by: None,
            reconciled_at: None,
            deleted_by: None,
            deleted_at: None,
        };
        assert!(!rec.is_flagged());
        assert!(!rec.has_error_issue());

        rec.issues.push(ValidationIssue {
            kind: IssueKind::Duplicate,
            severity: Severity::Warning,
            message: "dup".to_string(),
            data: serde_json::json!({}),
        });
        assert!(rec.is_flagged());
        assert!(!rec.has_error_issue());

        rec.issues.push(ValidationIssue {
            kind: IssueKind::MissingOut,
            severity: Severity::Error,
            message: "missing out".to_string(),
            data: serde_json::json!({}),
        });
        assert!(rec.has_error_issue());

        rec.issues.clear();
        rec.status = DayStatus::Unknown;
        assert!(rec.is_flagged(), "unknown status alone flags the record");
    }
}
