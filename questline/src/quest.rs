//! Quest document model: an ordered collection of dependency-linked steps.
//!
//! The document's source of truth lives on disk; the scheduler reloads it on
//! every tick and never caches it across ticks, so external edits between
//! ticks are picked up rather than clobbered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Free-form execution log, appended to as steps settle.
    #[serde(default)]
    pub log: Vec<String>,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: StepStatus,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Complete,
    Blocked,
    PartiallyComplete,
}

impl StepStatus {
    /// The document's string form, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Complete => "complete",
            StepStatus::Blocked => "blocked",
            StepStatus::PartiallyComplete => "partially_complete",
        }
    }
}

impl Quest {
    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|step| step.id == id)
    }

    /// True when every step has settled as `complete`.
    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|step| step.status == StepStatus::Complete)
    }
}

/// Minimal single-step quest written by `questline init`.
pub fn skeleton_quest() -> Quest {
    Quest {
        id: "quest-0001".to_string(),
        title: "Untitled quest".to_string(),
        created_at: Utc::now(),
        log: Vec::new(),
        steps: vec![Step {
            id: "step-1".to_string(),
            name: "First step".to_string(),
            description: "Describe the work for this step.".to_string(),
            status: StepStatus::Pending,
            depends_on: Vec::new(),
            started_at: None,
            completed_at: None,
        }],
    }
}
