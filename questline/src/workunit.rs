//! Work-unit construction: maps (role, step) to the payload a worker needs.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::quest::{Quest, Step};
use crate::role::Role;

const MAPPER_TEMPLATE: &str = include_str!("prompts/mapper.md");
const IMPLEMENTER_TEMPLATE: &str = include_str!("prompts/implementer.md");
const VALIDATOR_TEMPLATE: &str = include_str!("prompts/validator.md");
const REVIEWER_TEMPLATE: &str = include_str!("prompts/reviewer.md");
const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");

/// Everything one worker process needs for one dispatch.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub role: Role,
    pub step_id: String,
    /// Rendered prompt fed to the worker on stdin.
    pub prompt: String,
    /// Working directory for the worker process.
    pub workdir: PathBuf,
    /// Where the worker must leave its signal JSON, if it emits one.
    pub signal_path: PathBuf,
    /// Where the spawner writes the worker's captured output.
    pub log_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct StepContext {
    id: String,
    name: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct DepContext {
    id: String,
    name: String,
    status: String,
}

/// Renders per-role worker payloads from the quest document.
pub struct WorkUnitBuilder {
    env: Environment<'static>,
    project_dir: PathBuf,
}

impl WorkUnitBuilder {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        let mut env = Environment::new();
        env.add_template("mapper", MAPPER_TEMPLATE)
            .expect("mapper template should be valid");
        env.add_template("implementer", IMPLEMENTER_TEMPLATE)
            .expect("implementer template should be valid");
        env.add_template("validator", VALIDATOR_TEMPLATE)
            .expect("validator template should be valid");
        env.add_template("reviewer", REVIEWER_TEMPLATE)
            .expect("reviewer template should be valid");
        env.add_template("repair", REPAIR_TEMPLATE)
            .expect("repair template should be valid");
        Self {
            env,
            project_dir: project_dir.into(),
        }
    }

    /// Build the payload for dispatching `step` under `role`.
    ///
    /// `notes` carries hand-off context into the prompt: the continuation
    /// point of a resumed session, or the reason a followup role was called
    /// in. Roles that need context beyond a single step are rejected.
    pub fn build(
        &self,
        role: Role,
        quest: &Quest,
        step: &Step,
        notes: Option<&str>,
    ) -> Result<WorkUnit> {
        if !role.step_scoped() {
            bail!("role {role} requires quest-wide context and cannot be dispatched per step");
        }

        let deps: Vec<DepContext> = step
            .depends_on
            .iter()
            .filter_map(|id| quest.step(id))
            .map(|dep| DepContext {
                id: dep.id.clone(),
                name: dep.name.clone(),
                status: dep.status.as_str().to_string(),
            })
            .collect();

        let signal_path = self.signal_path(&step.id);
        let template = self.env.get_template(role.as_str())?;
        let prompt = template.render(context! {
            quest_title => quest.title.trim(),
            step => StepContext {
                id: step.id.clone(),
                name: step.name.clone(),
                description: step.description.clone(),
            },
            deps => deps,
            signal_path => signal_path.display().to_string(),
            notes => notes.map(str::trim).filter(|s| !s.is_empty()),
        })?;

        Ok(WorkUnit {
            role,
            step_id: step.id.clone(),
            prompt,
            workdir: self.project_dir.clone(),
            signal_path,
            log_path: self.log_path(&step.id),
        })
    }

    pub fn signal_path(&self, step_id: &str) -> PathBuf {
        self.state_dir().join("signals").join(format!("{step_id}.json"))
    }

    fn log_path(&self, step_id: &str) -> PathBuf {
        self.state_dir().join("logs").join(format!("{step_id}.log"))
    }

    fn state_dir(&self) -> PathBuf {
        self.project_dir.join(".questline")
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::StepStatus;
    use crate::test_support::{quest, step, step_with_status};

    #[test]
    fn build_renders_step_fields_and_signal_contract() {
        let quest = quest(vec![step("parse-config", &[])]);
        let builder = WorkUnitBuilder::new("/tmp/project");

        let unit = builder
            .build(Role::Implementer, &quest, &quest.steps[0], None)
            .expect("build");

        assert_eq!(unit.step_id, "parse-config");
        assert!(unit.prompt.contains("parse-config"));
        assert!(unit.prompt.contains("partially-complete"));
        assert!(unit.prompt.contains(".questline/signals/parse-config.json"));
        assert!(!unit.prompt.contains("Handoff notes"));
    }

    #[test]
    fn build_lists_completed_dependencies() {
        let quest = quest(vec![
            step_with_status("schema", &[], StepStatus::Complete),
            step("loader", &["schema"]),
        ]);
        let builder = WorkUnitBuilder::new("/tmp/project");

        let unit = builder
            .build(Role::Validator, &quest, &quest.steps[1], None)
            .expect("build");
        assert!(unit.prompt.contains("schema"));
        assert!(unit.prompt.contains("complete"));
    }

    #[test]
    fn notes_render_as_handoff_block() {
        let quest = quest(vec![step("a", &[])]);
        let builder = WorkUnitBuilder::new("/tmp/project");

        let unit = builder
            .build(
                Role::Implementer,
                &quest,
                &quest.steps[0],
                Some("finish the retry path"),
            )
            .expect("build");
        assert!(unit.prompt.contains("Handoff notes"));
        assert!(unit.prompt.contains("finish the retry path"));
    }

    #[test]
    fn quest_scoped_roles_are_rejected() {
        let quest = quest(vec![step("a", &[])]);
        let builder = WorkUnitBuilder::new("/tmp/project");

        let err = builder
            .build(Role::Planner, &quest, &quest.steps[0], None)
            .unwrap_err();
        assert!(err.to_string().contains("quest-wide context"));
    }

    #[test]
    fn every_step_scoped_role_has_a_template() {
        let quest = quest(vec![step("a", &[])]);
        let builder = WorkUnitBuilder::new("/tmp/project");

        for role in [
            Role::Mapper,
            Role::Implementer,
            Role::Validator,
            Role::Reviewer,
            Role::Repair,
        ] {
            let unit = builder
                .build(role, &quest, &quest.steps[0], None)
                .expect("build");
            assert!(!unit.prompt.trim().is_empty(), "{role} prompt empty");
        }
    }
}
