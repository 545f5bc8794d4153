//! Task tree types shared across selection, state, and persistence.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    Queued,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::Queued => "queued",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
        }
    }
}

/// A single task in the document-ordered tree.
///
/// Ids are document-position-derived (e.g. "2.3") and stable for the lifetime
/// of a run. Tasks are never removed mid-run; corrections reset them instead.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub requirement_refs: Vec<String>,
    #[serde(default)]
    pub property_refs: Vec<String>,
    #[serde(default)]
    pub children: Vec<Task>,
}

impl Task {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// True when every non-optional child is completed (vacuously true for leaves).
    pub fn non_optional_children_completed(&self) -> bool {
        self.children
            .iter()
            .filter(|child| !child.optional)
            .all(|child| child.status == TaskStatus::Completed)
    }
}

/// Find a task by id anywhere in the forest.
pub fn find_task<'a>(tasks: &'a [Task], id: &str) -> Option<&'a Task> {
    for task in tasks {
        if task.id == id {
            return Some(task);
        }
        if let Some(found) = find_task(&task.children, id) {
            return Some(found);
        }
    }
    None
}

/// Mutable variant of [`find_task`].
pub fn find_task_mut<'a>(tasks: &'a mut [Task], id: &str) -> Option<&'a mut Task> {
    for task in tasks {
        if task.id == id {
            return Some(task);
        }
        if let Some(found) = find_task_mut(&mut task.children, id) {
            return Some(found);
        }
    }
    None
}

/// Visit every task depth-first in document order.
pub fn walk_tasks(tasks: &[Task], visit: &mut dyn FnMut(&Task)) {
    for task in tasks {
        visit(task);
        walk_tasks(&task.children, visit);
    }
}

/// Mutable depth-first visit in document order.
pub fn walk_tasks_mut(tasks: &mut [Task], visit: &mut dyn FnMut(&mut Task)) {
    for task in tasks {
        visit(task);
        walk_tasks_mut(&mut task.children, visit);
    }
}

/// All task ids depth-first in document order.
pub fn task_ids(tasks: &[Task]) -> Vec<String> {
    let mut ids = Vec::new();
    walk_tasks(tasks, &mut |task| ids.push(task.id.clone()));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{task, task_with_children};

    #[test]
    fn find_task_descends_into_children() {
        let tasks = vec![
            task("1", "first"),
            task_with_children("2", "second", vec![task("2.1", "nested")]),
        ];
        assert_eq!(find_task(&tasks, "2.1").expect("found").description, "nested");
        assert!(find_task(&tasks, "9").is_none());
    }

    #[test]
    fn task_ids_are_document_ordered() {
        let tasks = vec![
            task("1", "a"),
            task_with_children("2", "b", vec![task("2.1", "c"), task("2.2", "d")]),
            task("3", "e"),
        ];
        assert_eq!(task_ids(&tasks), vec!["1", "2", "2.1", "2.2", "3"]);
    }

    #[test]
    fn non_optional_children_completed_ignores_optional() {
        let mut parent = task_with_children("2", "p", vec![task("2.1", "a"), task("2.2", "b")]);
        parent.children[0].status = TaskStatus::Completed;
        parent.children[1].optional = true;
        assert!(parent.non_optional_children_completed());
    }

    #[test]
    fn status_round_trips_through_serde() {
        let json = serde_json::to_string(&TaskStatus::InProgress).expect("serialize");
        assert_eq!(json, "\"in_progress\"");
        let status: TaskStatus = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(status, TaskStatus::InProgress);
    }
}
