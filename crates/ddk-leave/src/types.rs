use chrono::NaiveDate;
use ddk_schemas::{Actor, LeaveApplication, LeaveStatus};
use ddk_store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// NewLeave
// ---------------------------------------------------------------------------

/// Request to open a leave application over an inclusive `[from_day, to_day]`
/// range. The facility is derived from the person's roster entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLeave {
    pub person_id: Uuid,
    pub from_day: NaiveDate,
    pub to_day: NaiveDate,
    pub reason: String,
    pub requested_by: Actor,
}

// ---------------------------------------------------------------------------
// LeaveError
// ---------------------------------------------------------------------------

/// Failure of a leave operation.
#[derive(Debug)]
pub enum LeaveError {
    /// Request rejected at the boundary (inverted range, empty reason,
    /// early-return date outside the application's range).
    ValidationFailure(String),
    /// The requested range intersects an existing pending/approved
    /// application for the same person.
    OverlappingLeave { existing: LeaveApplication },
    /// The transition is not legal from the application's current status.
    InvalidStateTransition {
        from: LeaveStatus,
        action: &'static str,
    },
    /// Only the creator or an admin may perform this transition.
    Forbidden { actor: String },
    /// Unknown application or person.
    NotFound(Uuid),
    Backend(StoreError),
}

impl fmt::Display for LeaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaveError::ValidationFailure(msg) => write!(f, "leave request invalid: {msg}"),
            LeaveError::OverlappingLeave { existing } => write!(
                f,
                "overlaps existing {} leave {} ({} to {})",
                existing.status.as_str(),
                existing.leave_id,
                existing.from_day,
                existing.to_day
            ),
            LeaveError::InvalidStateTransition { from, action } => {
                write!(f, "cannot {action} a {} application", from.as_str())
            }
            LeaveError::Forbidden { actor } => {
                write!(f, "{actor} is neither the creator nor an admin")
            }
            LeaveError::NotFound(id) => write!(f, "no such leave application or person: {id}"),
            LeaveError::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LeaveError {}

impl From<StoreError> for LeaveError {
    fn from(err: StoreError) -> Self {
        LeaveError::Backend(err)
    }
}
