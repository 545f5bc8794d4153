//! Semantic invariants over a parsed spec.

use std::collections::HashSet;

use crate::spec::ParsedSpec;
use crate::tasks::{Task, TaskStatus, walk_tasks};

/// Check invariants the schema cannot express:
/// - no duplicate task ids;
/// - requirement/property cross-references resolve;
/// - a completed parent has all non-optional children completed;
/// - at most one task is in progress.
pub fn validate_spec(spec: &ParsedSpec) -> Vec<String> {
    let mut errors = Vec::new();

    let requirement_ids: HashSet<&str> =
        spec.requirements.iter().map(|req| req.id.as_str()).collect();
    let property_ids: HashSet<&str> =
        spec.properties.iter().map(|prop| prop.id.as_str()).collect();

    let mut seen = HashSet::new();
    let mut in_progress = Vec::new();
    walk_tasks(&spec.tasks, &mut |task| {
        if !seen.insert(task.id.clone()) {
            errors.push(format!("duplicate task id '{}'", task.id));
        }
        for reference in &task.requirement_refs {
            if !requirement_ids.contains(reference.as_str()) {
                errors.push(format!(
                    "task '{}' references unknown requirement '{}'",
                    task.id, reference
                ));
            }
        }
        for reference in &task.property_refs {
            if !property_ids.contains(reference.as_str()) {
                errors.push(format!(
                    "task '{}' references unknown property '{}'",
                    task.id, reference
                ));
            }
        }
        if task.status == TaskStatus::InProgress {
            in_progress.push(task.id.clone());
        }
        validate_completion(task, &mut errors);
    });

    if in_progress.len() > 1 {
        errors.push(format!(
            "multiple tasks in progress: {}",
            in_progress.join(", ")
        ));
    }

    errors
}

fn validate_completion(task: &Task, errors: &mut Vec<String>) {
    if task.status == TaskStatus::Completed && !task.non_optional_children_completed() {
        errors.push(format!(
            "task '{}' is completed but has incomplete non-optional children",
            task.id
        ));
    }
}
