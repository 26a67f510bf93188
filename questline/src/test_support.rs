//! Test-only scripted collaborators and quest builders.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::Utc;
use tokio::task::JoinHandle;

use crate::core::signal::Signal;
use crate::core::types::WorkerOutcome;
use crate::io::quest_store::write_quest;
use crate::io::ward::{WardReport, WardRunner};
use crate::io::worker::{SpawnRequest, WorkerSpawner};
use crate::quest::{Quest, Step, StepStatus};
use crate::role::Role;
use crate::scheduler::SchedulerOptions;
use crate::slots::SlotCapability;

/// Create a deterministic pending step with the given dependencies.
pub fn step(id: &str, deps: &[&str]) -> Step {
    Step {
        id: id.to_string(),
        name: format!("{id} name"),
        description: format!("{id} description"),
        status: StepStatus::Pending,
        depends_on: deps.iter().map(|dep| dep.to_string()).collect(),
        started_at: None,
        completed_at: None,
    }
}

/// Create a step with an explicit status.
pub fn step_with_status(id: &str, deps: &[&str], status: StepStatus) -> Step {
    let mut step = step(id, deps);
    step.status = status;
    step
}

/// Create a quest wrapping the given steps.
pub fn quest(steps: Vec<Step>) -> Quest {
    Quest {
        id: "quest-test".to_string(),
        title: "Test quest".to_string(),
        created_at: Utc::now(),
        log: Vec::new(),
        steps,
    }
}

/// An outcome that settles with `crashed=false`, `timed_out=false`, no signal.
pub fn clean_outcome() -> WorkerOutcome {
    WorkerOutcome {
        session_id: None,
        crashed: false,
        timed_out: false,
        signal: None,
    }
}

/// A clean settlement carrying a structured signal.
pub fn signal_outcome(signal: Signal) -> WorkerOutcome {
    WorkerOutcome {
        signal: Some(signal),
        ..clean_outcome()
    }
}

/// A crash settlement, optionally reporting a resumable session.
pub fn crashed_outcome(session: Option<&str>) -> WorkerOutcome {
    WorkerOutcome {
        session_id: session.map(str::to_string),
        crashed: true,
        timed_out: false,
        signal: None,
    }
}

/// On-disk quest fixture in a temp directory.
pub struct TestQuest {
    dir: tempfile::TempDir,
}

impl TestQuest {
    pub fn new(quest: &Quest) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        write_quest(&dir.path().join("quest.json"), quest)?;
        Ok(Self { dir })
    }

    pub fn project_dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn quest_path(&self) -> PathBuf {
        self.dir.path().join("quest.json")
    }

    pub fn opts(&self, role: Role, slot_count: usize) -> SchedulerOptions {
        SchedulerOptions {
            quest_path: self.quest_path(),
            project_dir: self.project_dir().to_path_buf(),
            slot_count,
            timeout: Duration::from_secs(5),
            role,
            output_limit_bytes: 64_000,
        }
    }
}

/// One scripted worker settlement with an optional settle delay.
#[derive(Debug, Clone)]
pub struct ScriptedWorker {
    pub outcome: WorkerOutcome,
    pub delay: Duration,
}

impl ScriptedWorker {
    pub fn settles(outcome: WorkerOutcome) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
        }
    }

    pub fn after(outcome: WorkerOutcome, delay: Duration) -> Self {
        Self { outcome, delay }
    }
}

/// Record of one spawn call, in dispatch order.
#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub step_id: String,
    pub role: Role,
    pub resume_session: Option<String>,
    pub prompt: String,
}

/// Spawner that settles each dispatch with the next scripted outcome.
///
/// Tracks dispatch records and the high-water mark of concurrently running
/// workers so tests can assert the slot budget held.
pub struct ScriptedSpawner {
    script: Mutex<VecDeque<ScriptedWorker>>,
    records: Mutex<Vec<SpawnRecord>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl ScriptedSpawner {
    pub fn new(script: Vec<ScriptedWorker>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            records: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn records(&self) -> Vec<SpawnRecord> {
        self.records.lock().expect("records lock").clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl WorkerSpawner for ScriptedSpawner {
    fn spawn(&self, request: SpawnRequest) -> JoinHandle<Result<WorkerOutcome>> {
        self.records.lock().expect("records lock").push(SpawnRecord {
            step_id: request.unit.step_id.clone(),
            role: request.unit.role,
            resume_session: request.resume_session.clone(),
            prompt: request.unit.prompt.clone(),
        });
        let scripted = self.script.lock().expect("script lock").pop_front();
        let in_flight = Arc::clone(&self.in_flight);
        let max_in_flight = Arc::clone(&self.max_in_flight);
        tokio::spawn(async move {
            let Some(worker) = scripted else {
                return Err(anyhow!("spawner script exhausted"));
            };
            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(current, Ordering::SeqCst);
            if !worker.delay.is_zero() {
                tokio::time::sleep(worker.delay).await;
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(worker.outcome)
        })
    }
}

/// Ward that replays scripted reports; the last report repeats forever.
pub struct ScriptedWard {
    reports: Mutex<VecDeque<WardReport>>,
    runs: AtomicUsize,
}

impl ScriptedWard {
    pub fn sequence(reports: Vec<WardReport>) -> Self {
        Self {
            reports: Mutex::new(reports.into()),
            runs: AtomicUsize::new(0),
        }
    }

    pub fn always(report: WardReport) -> Self {
        Self::sequence(vec![report])
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl WardRunner for ScriptedWard {
    fn run(&self, _project_dir: &Path) -> Result<WardReport> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let mut reports = self.reports.lock().expect("reports lock");
        match reports.len() {
            0 => Err(anyhow!("ward script exhausted")),
            1 => Ok(reports.front().expect("front").clone()),
            _ => Ok(reports.pop_front().expect("pop")),
        }
    }
}

/// Capability that grants a single slot once and refuses all re-acquisition,
/// for starving respawn paths in tests.
#[derive(Debug, Default)]
pub struct OneShotSlots {
    granted: bool,
    held: bool,
}

impl SlotCapability for OneShotSlots {
    fn acquire(&mut self, _slot_count: usize) -> Option<usize> {
        if self.granted {
            return None;
        }
        self.granted = true;
        self.held = true;
        Some(0)
    }

    fn release(&mut self, index: usize) -> bool {
        let freed = self.held && index == 0;
        self.held = false;
        freed
    }

    fn active(&self) -> Vec<usize> {
        if self.held { vec![0] } else { Vec::new() }
    }
}
