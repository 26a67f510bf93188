//! Deterministic readiness evaluation over the quest document.

use crate::quest::{Quest, Step, StepStatus};

/// A step is ready iff it is `pending` and every dependency is `complete`.
///
/// Dependencies that do not resolve to a step leave it unready forever; the
/// store rejects such documents at load time anyway.
pub fn is_ready(step: &Step, quest: &Quest) -> bool {
    if step.status != StepStatus::Pending {
        return false;
    }
    step.depends_on
        .iter()
        .all(|id| quest.step(id).is_some_and(|dep| dep.status == StepStatus::Complete))
}

/// All ready steps in quest-document order (stable FIFO, no priority scheme).
pub fn ready_steps(quest: &Quest) -> Vec<&Step> {
    quest
        .steps
        .iter()
        .filter(|step| is_ready(step, quest))
        .collect()
}
