//! ddk-daemon as a library: router, shared state and wire types.
//!
//! The binary in `main.rs` is a thin shell over these modules, and the
//! route tests drive the router in-process through the same exports.

pub mod api_types;
pub mod routes;
pub mod state;
