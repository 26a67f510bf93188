//! Dependency-ordered quest scheduling over a bounded pool of worker
//! processes.
//!
//! A quest is an ordered document of steps with dependency edges. The
//! scheduler dispatches ready steps into a fixed budget of execution slots,
//! races the in-flight workers to discover completion order, and interprets
//! the structured signals workers leave behind. A pipeline coordinator
//! sequences five role-scoped runs and closes with a bounded ward/repair
//! loop. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (readiness, signals, invariants).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (document store, worker
//!   processes, ward check, config). Each sits behind a trait so tests can
//!   script it.
//!
//! Orchestration modules ([`scheduler`], [`runner`], [`pipeline`],
//! [`workunit`]) coordinate core logic with I/O.

pub mod core;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod quest;
pub mod role;
pub mod runner;
pub mod scheduler;
pub mod slots;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workunit;
