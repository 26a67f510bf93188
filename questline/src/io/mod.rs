//! Side-effecting adapters around the scheduling core: document persistence,
//! worker process execution, the ward check, and configuration. Everything
//! here hides behind a trait so tests can script it.

pub mod config;
pub mod quest_store;
pub mod ward;
pub mod worker;
