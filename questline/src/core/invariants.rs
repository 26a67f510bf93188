//! Structural invariants for quest documents.

use std::collections::HashSet;

use crate::quest::Quest;

/// Violations enforced on every load: unique ids, resolvable dependencies,
/// no self-dependency. Returns human-readable messages, empty when valid.
pub fn validate_invariants(quest: &Quest) -> Vec<String> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for step in &quest.steps {
        if !seen.insert(step.id.as_str()) {
            errors.push(format!("duplicate step id '{}'", step.id));
        }
        if step.id.trim().is_empty() {
            errors.push("step id must not be empty".to_string());
        }
    }

    for step in &quest.steps {
        for dep in &step.depends_on {
            if dep == &step.id {
                errors.push(format!("step '{}' depends on itself", step.id));
            } else if quest.step(dep).is_none() {
                errors.push(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                ));
            }
        }
    }

    errors
}

/// Dependency cycles, reported as `a -> b -> a` chains.
///
/// Cycles are not a load error: a cyclic subgraph simply never becomes ready
/// and the scheduler ends such runs as silent terminal success. The
/// `validate` command surfaces them so an author can untangle the document.
pub fn dependency_cycles(quest: &Quest) -> Vec<String> {
    let mut cycles = Vec::new();
    let mut done: HashSet<&str> = HashSet::new();

    for step in &quest.steps {
        let mut path = Vec::new();
        visit(quest, &step.id, &mut path, &mut done, &mut cycles);
    }

    cycles
}

fn visit<'a>(
    quest: &'a Quest,
    id: &'a str,
    path: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
    cycles: &mut Vec<String>,
) {
    if done.contains(id) {
        return;
    }
    if let Some(position) = path.iter().position(|seen| *seen == id) {
        let mut chain: Vec<&str> = path[position..].to_vec();
        chain.push(id);
        cycles.push(chain.join(" -> "));
        return;
    }
    let Some(step) = quest.step(id) else {
        return;
    };

    path.push(id);
    for dep in &step.depends_on {
        visit(quest, dep, path, done, cycles);
    }
    path.pop();
    done.insert(id);
}
