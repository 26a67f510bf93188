//! Drives the scheduler tick until a terminal result.

use anyhow::Result;
use tracing::debug;

use crate::core::types::SchedulerResult;
use crate::io::quest_store::QuestStore;
use crate::io::worker::WorkerSpawner;
use crate::scheduler::{Scheduler, SchedulerOptions, TickOutcome};
use crate::slots::SlotCapability;

/// Run one role-scoped scheduler pass to completion.
///
/// An explicit loop, not recursion: the active-slot set is the only state
/// threaded between ticks. A terminal result is never retried, and any error
/// propagating out of a tick is fatal to the run.
pub async fn run_scheduler<S, W, C>(
    store: &S,
    spawner: &W,
    slots: &mut C,
    opts: SchedulerOptions,
) -> Result<SchedulerResult>
where
    S: QuestStore,
    W: WorkerSpawner,
    C: SlotCapability,
{
    debug!(quest = %opts.quest_path.display(), role = %opts.role, "starting scheduler run");
    let mut scheduler = Scheduler::new(store, spawner, slots, opts);
    let mut active = Vec::new();
    loop {
        match scheduler.tick(active).await? {
            TickOutcome::Terminal(result) => return Ok(result),
            TickOutcome::Continue(next) => active = next,
        }
    }
}
