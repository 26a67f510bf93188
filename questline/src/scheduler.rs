//! One discrete transition of the scheduling state machine.
//!
//! A tick either dispatches the first ready step into a free slot, or races
//! the outstanding worker tasks and absorbs the first settlement. The quest
//! document is reloaded from the store at the top of every tick and never
//! cached across ticks.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::select_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::readiness::ready_steps;
use crate::core::signal::Signal;
use crate::core::types::{SchedulerResult, UserInputRequest, WorkerOutcome};
use crate::io::quest_store::{QuestStore, StepPatch};
use crate::io::worker::{SpawnRequest, WorkerSpawner};
use crate::quest::{Quest, Step, StepStatus};
use crate::role::Role;
use crate::slots::SlotCapability;
use crate::workunit::WorkUnitBuilder;

/// One occupied execution slot with its in-flight worker task.
///
/// Owned by the runner for the duration of a run; the set of entries never
/// exceeds the slot budget.
pub struct ActiveSlot {
    pub slot: usize,
    pub step_id: String,
    /// Session the dispatched worker was asked to resume, if any.
    pub session_id: Option<String>,
    pub task: JoinHandle<Result<WorkerOutcome>>,
}

/// Parameters shared by every tick of one scheduler run.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub quest_path: PathBuf,
    pub project_dir: PathBuf,
    pub slot_count: usize,
    /// Passed uniformly into every spawn; the spawner owns the timer.
    pub timeout: Duration,
    pub role: Role,
    pub output_limit_bytes: usize,
}

/// Outcome of a single tick.
pub enum TickOutcome {
    Terminal(SchedulerResult),
    Continue(Vec<ActiveSlot>),
}

pub struct Scheduler<'a, S, W, C> {
    store: &'a S,
    spawner: &'a W,
    slots: &'a mut C,
    builder: WorkUnitBuilder,
    opts: SchedulerOptions,
}

impl<'a, S, W, C> Scheduler<'a, S, W, C>
where
    S: QuestStore,
    W: WorkerSpawner,
    C: SlotCapability,
{
    pub fn new(store: &'a S, spawner: &'a W, slots: &'a mut C, opts: SchedulerOptions) -> Self {
        let builder = WorkUnitBuilder::new(&opts.project_dir);
        Self {
            store,
            spawner,
            slots,
            builder,
            opts,
        }
    }

    /// Perform exactly one scheduling transition.
    ///
    /// Dispatches at most one step per tick; the runner calls straight back,
    /// so remaining capacity fills up before the first settlement is awaited.
    pub async fn tick(&mut self, mut active: Vec<ActiveSlot>) -> Result<TickOutcome> {
        let quest = self.store.load(&self.opts.quest_path)?;

        if quest.is_complete() && active.is_empty() {
            return Ok(TickOutcome::Terminal(SchedulerResult::Completed));
        }

        // First ready step in document order; no other priority exists.
        let next_ready = ready_steps(&quest).first().map(|step| step.id.clone());
        if let Some(step_id) = next_ready {
            if let Some(slot) = self.slots.acquire(self.opts.slot_count) {
                let step = quest
                    .step(&step_id)
                    .context("ready step vanished from quest")?;
                self.store
                    .update_step(&self.opts.quest_path, &step_id, &StepPatch::started(Utc::now()))?;
                info!(step_id = %step_id, slot, role = %self.opts.role, "dispatching step");
                let entry = self.spawn_into(slot, &quest, step, None, None, self.opts.role)?;
                active.push(entry);
                return Ok(TickOutcome::Continue(active));
            }
        }

        if active.is_empty() {
            // Nothing runnable and nothing running: either fully done or
            // permanently blocked by unmet dependencies. The two are not
            // distinguished and neither is an error.
            return Ok(TickOutcome::Terminal(SchedulerResult::Completed));
        }

        let (entry, outcome) = self.race(&mut active).await?;

        if outcome.crashed || outcome.timed_out {
            self.respawn_after_failure(&mut active, &entry, &outcome)?;
            return Ok(TickOutcome::Continue(active));
        }

        match outcome.signal.clone() {
            None => {
                // Clean exit with no structured signal counts as completion.
                self.store.update_step(
                    &self.opts.quest_path,
                    &entry.step_id,
                    &StepPatch::completed(Utc::now()),
                )?;
                info!(step_id = %entry.step_id, "step completed");
            }
            Some(signal) => {
                if let Some(result) = self.handle_signal(&mut active, &entry, &outcome, signal)? {
                    return Ok(TickOutcome::Terminal(result));
                }
            }
        }

        Ok(TickOutcome::Continue(active))
    }

    /// Race every outstanding task; the settled entry leaves the active set
    /// and its slot is released before the outcome is interpreted.
    async fn race(&mut self, active: &mut Vec<ActiveSlot>) -> Result<(ActiveSlot, WorkerOutcome)> {
        let tasks: Vec<_> = active.iter_mut().map(|entry| &mut entry.task).collect();
        let (joined, index, _) = select_all(tasks).await;
        let entry = active.remove(index);
        self.slots.release(entry.slot);
        let outcome = joined.context("worker task aborted")??;
        debug!(step_id = %entry.step_id, slot = entry.slot, "worker task settled");
        Ok((entry, outcome))
    }

    /// Crash/timeout recovery: one in-place respawn of the same step when
    /// capacity allows, resuming the prior session if one is known. Without
    /// capacity the attempt is dropped and the step stays `in_progress`.
    fn respawn_after_failure(
        &mut self,
        active: &mut Vec<ActiveSlot>,
        entry: &ActiveSlot,
        outcome: &WorkerOutcome,
    ) -> Result<()> {
        warn!(
            step_id = %entry.step_id,
            crashed = outcome.crashed,
            timed_out = outcome.timed_out,
            "worker failed"
        );
        let quest = self.store.load(&self.opts.quest_path)?;
        let Some(step) = quest.step(&entry.step_id) else {
            warn!(step_id = %entry.step_id, "failed step no longer in quest, dropping attempt");
            return Ok(());
        };
        let Some(slot) = self.slots.acquire(self.opts.slot_count) else {
            warn!(step_id = %entry.step_id, "no free slot for respawn, dropping attempt");
            return Ok(());
        };
        let session = outcome
            .session_id
            .clone()
            .or_else(|| entry.session_id.clone());
        info!(step_id = %entry.step_id, slot, resuming = session.is_some(), "respawning failed worker");
        let entry = self.spawn_into(slot, &quest, step, session, None, self.opts.role)?;
        active.push(entry);
        Ok(())
    }

    /// Interpret a worker's structured signal. `Some(result)` ends the run.
    fn handle_signal(
        &mut self,
        active: &mut Vec<ActiveSlot>,
        entry: &ActiveSlot,
        outcome: &WorkerOutcome,
        signal: Signal,
    ) -> Result<Option<SchedulerResult>> {
        match signal {
            Signal::Complete { summary } => {
                self.store.update_step(
                    &self.opts.quest_path,
                    &entry.step_id,
                    &StepPatch::completed(Utc::now()),
                )?;
                self.store.append_log(
                    &self.opts.quest_path,
                    &format!("step {}: {}", entry.step_id, summary),
                )?;
                info!(step_id = %entry.step_id, "step completed");
                Ok(None)
            }
            Signal::NeedsUserInput { question, context } => {
                // Ends the whole run. Remaining in-flight workers are left
                // running unobserved; their own spawn timeouts end them.
                info!(step_id = %entry.step_id, "worker needs user input, ending run");
                Ok(Some(SchedulerResult::UserInputNeeded(UserInputRequest {
                    step_id: entry.step_id.clone(),
                    question,
                    context,
                })))
            }
            Signal::PartiallyComplete {
                progress,
                continuation_point,
            } => {
                self.store.update_step(
                    &self.opts.quest_path,
                    &entry.step_id,
                    &StepPatch::status(StepStatus::PartiallyComplete),
                )?;
                info!(step_id = %entry.step_id, progress = %progress, "step partially complete");
                let Some(slot) = self.slots.acquire(self.opts.slot_count) else {
                    // Stays `partially_complete`; the readiness evaluator only
                    // selects pending steps, so nothing picks this back up.
                    warn!(step_id = %entry.step_id, "no free slot to resume partial step");
                    return Ok(None);
                };
                let quest = self.store.load(&self.opts.quest_path)?;
                let Some(step) = quest.step(&entry.step_id) else {
                    self.slots.release(slot);
                    warn!(step_id = %entry.step_id, "partial step no longer in quest");
                    return Ok(None);
                };
                let instruction = continuation_point
                    .as_deref()
                    .unwrap_or("Continue where the previous session left off.");
                let session = outcome
                    .session_id
                    .clone()
                    .or_else(|| entry.session_id.clone());
                let next = self.spawn_into(
                    slot,
                    &quest,
                    step,
                    session,
                    Some(instruction),
                    self.opts.role,
                )?;
                active.push(next);
                Ok(None)
            }
            Signal::NeedsRoleFollowup {
                target_role,
                reason,
                context,
            } => {
                info!(
                    step_id = %entry.step_id,
                    target_role = %target_role,
                    reason = reason.as_deref().unwrap_or(""),
                    "role followup requested"
                );
                let Some(slot) = self.slots.acquire(self.opts.slot_count) else {
                    warn!(step_id = %entry.step_id, "no free slot for role followup");
                    return Ok(None);
                };
                let quest = self.store.load(&self.opts.quest_path)?;
                let Some(step) = quest.step(&entry.step_id) else {
                    self.slots.release(slot);
                    warn!(step_id = %entry.step_id, "followup step no longer in quest");
                    return Ok(None);
                };
                let notes = reason.or(context);
                // Fresh session: the followup role starts from its own view.
                let next =
                    self.spawn_into(slot, &quest, step, None, notes.as_deref(), target_role)?;
                active.push(next);
                Ok(None)
            }
        }
    }

    /// Build the work unit and begin the worker task without waiting for it.
    fn spawn_into(
        &mut self,
        slot: usize,
        quest: &Quest,
        step: &Step,
        resume_session: Option<String>,
        notes: Option<&str>,
        role: Role,
    ) -> Result<ActiveSlot> {
        let unit = match self.builder.build(role, quest, step, notes) {
            Ok(unit) => unit,
            Err(err) => {
                self.slots.release(slot);
                return Err(err);
            }
        };
        let task = self.spawner.spawn(SpawnRequest {
            unit,
            timeout: self.opts.timeout,
            resume_session: resume_session.clone(),
            output_limit_bytes: self.opts.output_limit_bytes,
        });
        Ok(ActiveSlot {
            slot,
            step_id: step.id.clone(),
            session_id: resume_session,
            task,
        })
    }
}
