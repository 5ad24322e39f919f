//! Reconciliation Surface: the operator's queue of ambiguous records, plus
//! the state-drift tools.
//!
//! The queue is every non-deleted record of a facility/date that carries
//! issues or an `unknown` status, with aggregate counts for triage. Operators
//! clear it record by record or with approve-all, which reconciles
//! everything not carrying an error-severity issue. Drift between the cached
//! person state and the ledger is reported verbatim and only ever changed by
//! the explicit reset operation.

mod engine;
mod types;

pub use engine::ReconcileEngine;
pub use types::*;
