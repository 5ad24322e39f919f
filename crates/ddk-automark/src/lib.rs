//! Auto-Mark: the unattended end-of-day sweep.
//!
//! For every active person without a record on the target date, writes a
//! definitive day-end record: on-leave people get `on_leave`, everyone else
//! gets a verdict derived from their cached current state (IN = present,
//! OUT = absent). That derivation trusts a cache that is allowed to drift;
//! the consistency tools exist for exactly that reason. Re-running a date is
//! a no-op because the day-end write itself checks for existing records.
//!
//! Scheduling is one tokio task per facility, each sleeping until its own
//! facility-local fire time.

mod engine;
mod timer;

pub use engine::{AutoMarkEngine, AutoMarkError};
pub use timer::{next_run_after, TimerSupervisor};
