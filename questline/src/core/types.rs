//! Shared settlement and run-outcome types.
//!
//! These are the stable contracts between the scheduler, the worker spawner,
//! and the pipeline. They stay deterministic and carry no I/O handles.

use crate::core::signal::Signal;

/// Produced exactly once per worker task settlement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// Session token reported by the worker, usable for resumption.
    pub session_id: Option<String>,
    /// The worker process exited abnormally.
    pub crashed: bool,
    /// The worker hit the spawn-level timeout and was killed.
    pub timed_out: bool,
    /// Structured signal the worker left behind, if any.
    pub signal: Option<Signal>,
}

/// Terminal value of one scheduler run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SchedulerResult {
    Completed,
    UserInputNeeded(UserInputRequest),
}

/// Question surfaced to the caller when a worker signals `needs-user-input`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInputRequest {
    pub step_id: String,
    pub question: String,
    pub context: String,
}
