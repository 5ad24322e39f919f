//! Event Ingest: turns raw movement events into ledger records.
//!
//! One pipeline for every source. An explicit direction is taken as-is
//! (subject to the facility's first-entry policy); an omitted one toggles
//! from the last non-deleted same-day record. Approved leave blocks the
//! write unless an override names a leave application, in which case that
//! day's leave-sourced record is removed first so the two sources never
//! coexist. The validator runs before the write and its error-severity
//! issues clear the `reconciled` flag; the write itself is never blocked
//! by advisories. Bulk ingestion runs the same pipeline per row, one bad
//! row never aborting the batch.

mod engine;
mod types;

pub use engine::IngestEngine;
pub use types::*;
