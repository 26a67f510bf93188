//! Quest pipeline CLI.
//!
//! Thin adapter over the library's produced interface: wires the file store,
//! the `claude` worker spawner, the command ward, and an in-process slot map
//! into scheduler and pipeline runs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use questline::core::invariants::dependency_cycles;
use questline::core::types::SchedulerResult;
use questline::io::config::{QuestlineConfig, load_config, write_config};
use questline::io::quest_store::{FsQuestStore, QuestStore, write_quest};
use questline::io::ward::CommandWard;
use questline::io::worker::ClaudeSpawner;
use questline::pipeline::{PipelineOptions, run_pipeline};
use questline::quest::{StepStatus, skeleton_quest};
use questline::role::Role;
use questline::runner::run_scheduler;
use questline::scheduler::SchedulerOptions;
use questline::slots::FixedSlots;

#[derive(Parser)]
#[command(
    name = "questline",
    version,
    about = "Dependency-ordered quest scheduler for agent workers"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.questline/config.toml` and a skeleton quest document.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Check the quest document against schema and invariants.
    Validate {
        #[arg(long, default_value = "quest.json")]
        quest: PathBuf,
    },
    /// Run one role-scoped scheduler pass.
    Run {
        #[arg(long, value_enum)]
        role: Role,
        #[arg(long, default_value = "quest.json")]
        quest: PathBuf,
    },
    /// Run the full five-stage pipeline.
    Pipeline {
        #[arg(long, default_value = "quest.json")]
        quest: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    questline::logging::init();
    if let Err(err) = run().await {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(force),
        Command::Validate { quest } => cmd_validate(&quest),
        Command::Run { role, quest } => cmd_run(role, &quest).await,
        Command::Pipeline { quest } => cmd_pipeline(&quest).await,
    }
}

fn config_path() -> PathBuf {
    PathBuf::from(".questline/config.toml")
}

fn cmd_init(force: bool) -> Result<()> {
    let config = config_path();
    if force || !config.exists() {
        write_config(&config, &QuestlineConfig::default())?;
    }

    let quest_path = Path::new("quest.json");
    if force || !quest_path.exists() {
        write_quest(quest_path, &skeleton_quest())?;
    }

    println!("initialized {} and quest.json", config.display());
    Ok(())
}

fn cmd_validate(quest_path: &Path) -> Result<()> {
    let quest = FsQuestStore.load(quest_path)?;

    let cycles = dependency_cycles(&quest);
    if !cycles.is_empty() {
        bail!("dependency cycles:\n- {}", cycles.join("\n- "));
    }

    for step in &quest.steps {
        if step.status == StepStatus::PartiallyComplete {
            println!(
                "note: step '{}' is partially_complete and will not be rescheduled; \
                 reset it to pending to pick it back up",
                step.id
            );
        }
    }

    println!("{} ok ({} steps)", quest_path.display(), quest.steps.len());
    Ok(())
}

async fn cmd_run(role: Role, quest_path: &Path) -> Result<()> {
    let cfg = load_config(&config_path())?;
    let project_dir = std::env::current_dir().context("resolve project dir")?;
    let store = FsQuestStore;
    let spawner = ClaudeSpawner::new(cfg.worker.command.clone());
    let mut slots = FixedSlots::new();

    let result = run_scheduler(
        &store,
        &spawner,
        &mut slots,
        SchedulerOptions {
            quest_path: quest_path.to_path_buf(),
            project_dir,
            slot_count: cfg.slot_count,
            timeout: Duration::from_secs(cfg.worker_timeout_secs),
            role,
            output_limit_bytes: cfg.worker_output_limit_bytes,
        },
    )
    .await?;

    report(&result);
    Ok(())
}

async fn cmd_pipeline(quest_path: &Path) -> Result<()> {
    let cfg = load_config(&config_path())?;
    let project_dir = std::env::current_dir().context("resolve project dir")?;
    let store = FsQuestStore;
    let spawner = ClaudeSpawner::new(cfg.worker.command.clone());
    let ward = CommandWard {
        command: cfg.ward.command.clone(),
        timeout: Duration::from_secs(cfg.ward.timeout_secs),
        output_limit_bytes: cfg.ward_output_limit_bytes,
    };
    let mut slots = FixedSlots::new();

    let result = run_pipeline(
        &store,
        &spawner,
        &mut slots,
        &ward,
        PipelineOptions {
            project_dir,
            quest_path: quest_path.to_path_buf(),
            slot_count: cfg.slot_count,
            timeout: Duration::from_secs(cfg.worker_timeout_secs),
            max_repair_iterations: cfg.max_repair_iterations,
            output_limit_bytes: cfg.worker_output_limit_bytes,
        },
    )
    .await?;

    report(&result);
    Ok(())
}

fn report(result: &SchedulerResult) {
    match result {
        SchedulerResult::Completed => println!("run complete"),
        SchedulerResult::UserInputNeeded(request) => {
            println!("step '{}' needs user input:", request.step_id);
            println!("  question: {}", request.question);
            println!("  context: {}", request.context);
        }
    }
}
