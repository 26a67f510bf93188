//! Pure, deterministic scheduling logic. No I/O.

pub mod invariants;
pub mod readiness;
pub mod signal;
pub mod types;
