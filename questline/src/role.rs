//! Worker roles: the behavioral profile assigned to a worker for a stage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Behavioral profile for a spawned worker.
///
/// The five step-scoped roles are the pipeline stages. `Planner` authors quest
/// documents and operates on the whole quest, which is why the work-unit
/// builder refuses to dispatch it against a single step.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Mapper,
    Implementer,
    Validator,
    Reviewer,
    Repair,
    Planner,
}

impl Role {
    /// Whether a work unit for this role can be built from a single step.
    pub fn step_scoped(self) -> bool {
        !matches!(self, Role::Planner)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Mapper => "mapper",
            Role::Implementer => "implementer",
            Role::Validator => "validator",
            Role::Reviewer => "reviewer",
            Role::Repair => "repair",
            Role::Planner => "planner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_as_kebab_case() {
        let json = serde_json::to_string(&Role::Repair).expect("serialize");
        assert_eq!(json, "\"repair\"");
        let parsed: Role = serde_json::from_str("\"mapper\"").expect("parse");
        assert_eq!(parsed, Role::Mapper);
    }

    #[test]
    fn only_planner_is_quest_scoped() {
        for role in [
            Role::Mapper,
            Role::Implementer,
            Role::Validator,
            Role::Reviewer,
            Role::Repair,
        ] {
            assert!(role.step_scoped(), "{role} should be step scoped");
        }
        assert!(!Role::Planner.step_scoped());
    }
}
