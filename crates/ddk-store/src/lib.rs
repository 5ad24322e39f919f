//! Storage and side-effect ports for the attendance engine.
//!
//! Engine crates (`ddk-ingest`, `ddk-leave`, `ddk-automark`, `ddk-reconcile`)
//! talk to persistence only through the traits in [`ports`]. Two
//! implementations exist: the in-memory store in this crate (tests, dev
//! daemon) and the PostgreSQL store in `ddk-db`.

mod mem;
mod ports;

pub use mem::MemoryStore;
pub use ports::*;
