//! Quest document persistence with schema + invariant validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::debug;

use crate::core::invariants::validate_invariants;
use crate::quest::{Quest, StepStatus};

const QUEST_SCHEMA: &str = include_str!("../../schemas/quest/v1.schema.json");

/// Partial update applied to one step's fields.
#[derive(Clone, Debug, Default)]
pub struct StepPatch {
    pub status: Option<StepStatus>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepPatch {
    pub fn status(status: StepStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Dispatch transition: `in_progress` with a start timestamp.
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(StepStatus::InProgress),
            started_at: Some(at),
            completed_at: None,
        }
    }

    /// Settlement transition: `complete` with a completion timestamp.
    pub fn completed(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(StepStatus::Complete),
            started_at: None,
            completed_at: Some(at),
        }
    }
}

/// Document persistence boundary. The scheduler reloads through this on every
/// tick and writes one step's fields at a time; it never holds the document
/// across ticks.
pub trait QuestStore {
    fn load(&self, path: &Path) -> Result<Quest>;
    fn update_step(&self, path: &Path, step_id: &str, patch: &StepPatch) -> Result<()>;
    fn append_log(&self, path: &Path, entry: &str) -> Result<()>;
}

/// JSON file store with schema-validated loads and atomic writes.
#[derive(Debug, Default)]
pub struct FsQuestStore;

impl QuestStore for FsQuestStore {
    fn load(&self, path: &Path) -> Result<Quest> {
        debug!(path = %path.display(), "loading quest");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read quest {}", path.display()))?;
        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("parse quest {}", path.display()))?;
        validate_schema(&value)
            .with_context(|| format!("validate quest {}", path.display()))?;
        let quest: Quest = serde_json::from_value(value)
            .with_context(|| format!("deserialize quest {}", path.display()))?;
        let errors = validate_invariants(&quest);
        if !errors.is_empty() {
            return Err(anyhow!("quest invariants failed: {}", errors.join("; ")));
        }
        Ok(quest)
    }

    fn update_step(&self, path: &Path, step_id: &str, patch: &StepPatch) -> Result<()> {
        let mut quest = read_quest(path)?;
        let step = quest
            .step_mut(step_id)
            .ok_or_else(|| anyhow!("unknown step '{step_id}' in {}", path.display()))?;
        if let Some(status) = patch.status {
            step.status = status;
        }
        if let Some(at) = patch.started_at {
            step.started_at = Some(at);
        }
        if let Some(at) = patch.completed_at {
            step.completed_at = Some(at);
        }
        debug!(step_id, status = ?patch.status, "updating step");
        write_quest(path, &quest)
    }

    fn append_log(&self, path: &Path, entry: &str) -> Result<()> {
        let mut quest = read_quest(path)?;
        quest.log.push(entry.to_string());
        write_quest(path, &quest)
    }
}

/// Parse without re-running schema validation; used for read-modify-write.
fn read_quest(path: &Path) -> Result<Quest> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read quest {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse quest {}", path.display()))
}

/// Atomically write a quest document (temp file + rename).
pub fn write_quest(path: &Path, quest: &Quest) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(quest)?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("quest path missing parent {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp quest {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace quest {}", path.display()))?;
    Ok(())
}

fn validate_schema(quest: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(QUEST_SCHEMA).context("parse quest schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(quest) {
        let messages = compiled
            .iter_errors(quest)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "quest schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}
