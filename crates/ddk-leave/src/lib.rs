//! ddk-leave
//!
//! Leave Coordinator: answers "is this person on leave for date X?" and owns
//! every leave-driven ledger write.
//!
//! Lifecycle rules:
//! - approve / reject are legal from `pending` only
//! - cancel / early-return are legal from `approved` only
//! - a new application must not intersect an existing pending/approved one
//!
//! Approval materializes one leave-sourced record per day of the range and
//! forces the person's state OUT; the reverse transitions soft-delete the
//! affected records and restore state IN. The effective-window rule itself
//! (inclusive range, early return excludes the return day) lives on
//! [`ddk_schemas::LeaveApplication`].

mod engine;
mod types;

pub use engine::LeaveEngine;
pub use types::*;
