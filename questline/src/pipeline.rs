//! Five-stage pipeline: map, implement, validate, review, repair.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::core::types::SchedulerResult;
use crate::io::quest_store::QuestStore;
use crate::io::ward::WardRunner;
use crate::io::worker::WorkerSpawner;
use crate::role::Role;
use crate::runner::run_scheduler;
use crate::scheduler::SchedulerOptions;
use crate::slots::SlotCapability;

/// Stages that run before the repair loop, in fixed order.
const STAGES: [Role; 4] = [
    Role::Mapper,
    Role::Implementer,
    Role::Validator,
    Role::Reviewer,
];

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub project_dir: PathBuf,
    pub quest_path: PathBuf,
    pub slot_count: usize,
    pub timeout: Duration,
    /// Repair loop ceiling, counting from 1.
    pub max_repair_iterations: u32,
    pub output_limit_bytes: usize,
}

/// Run the full pipeline over one quest document.
///
/// Stages share the slot capability, timeout, and quest document. Any stage
/// ending with `UserInputNeeded` short-circuits the pipeline; later stages
/// never run.
pub async fn run_pipeline<S, W, C, R>(
    store: &S,
    spawner: &W,
    slots: &mut C,
    ward: &R,
    opts: PipelineOptions,
) -> Result<SchedulerResult>
where
    S: QuestStore,
    W: WorkerSpawner,
    C: SlotCapability,
    R: WardRunner,
{
    for role in STAGES {
        info!(role = %role, "starting pipeline stage");
        let result = run_scheduler(store, spawner, slots, stage_opts(&opts, role)).await?;
        if let SchedulerResult::UserInputNeeded(_) = result {
            info!(role = %role, "stage needs user input, stopping pipeline");
            return Ok(result);
        }
    }

    repair_loop(store, spawner, slots, ward, &opts).await
}

/// Bounded ward/repair loop.
///
/// Exhausting the budget means "stop trying", not failure: the ceiling and
/// the no-parseable-errors case both end as terminal success.
async fn repair_loop<S, W, C, R>(
    store: &S,
    spawner: &W,
    slots: &mut C,
    ward: &R,
    opts: &PipelineOptions,
) -> Result<SchedulerResult>
where
    S: QuestStore,
    W: WorkerSpawner,
    C: SlotCapability,
    R: WardRunner,
{
    let mut iteration = 1u32;
    loop {
        let report = ward.run(&opts.project_dir)?;
        if report.success {
            info!(iteration, "ward passed");
            return Ok(SchedulerResult::Completed);
        }
        if iteration >= opts.max_repair_iterations {
            warn!(iteration, "repair budget exhausted, stopping");
            return Ok(SchedulerResult::Completed);
        }
        if report.errors.is_empty() {
            warn!(iteration, "ward failed without parseable errors, nothing to repair");
            return Ok(SchedulerResult::Completed);
        }

        info!(iteration, errors = report.errors.len(), "ward failed, dispatching repair");
        let result = run_scheduler(store, spawner, slots, stage_opts(opts, Role::Repair)).await?;
        if let SchedulerResult::UserInputNeeded(_) = result {
            return Ok(result);
        }
        iteration += 1;
    }
}

fn stage_opts(opts: &PipelineOptions, role: Role) -> SchedulerOptions {
    // The mapper works alone; every other stage gets the full budget.
    let slot_count = match role {
        Role::Mapper => 1,
        _ => opts.slot_count,
    };
    SchedulerOptions {
        quest_path: opts.quest_path.clone(),
        project_dir: opts.project_dir.clone(),
        slot_count,
        timeout: opts.timeout,
        role,
        output_limit_bytes: opts.output_limit_bytes,
    }
}
