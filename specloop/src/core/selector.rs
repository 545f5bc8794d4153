//! Deterministic task selection.

use crate::core::dependency::DependencyGraph;
use crate::tasks::{Task, TaskStatus};

/// True if any task in the forest is in progress.
pub fn any_in_progress(tasks: &[Task]) -> bool {
    tasks.iter().any(|task| {
        task.status == TaskStatus::InProgress || any_in_progress(&task.children)
    })
}

/// Select the next eligible task via a depth-first, document-order walk.
///
/// Returns `None` while any task is in progress (global mutual exclusion:
/// the correction loop must never race a running task) and once nothing is
/// eligible. Children are visited before their parent; a parent becomes
/// eligible only when all its non-optional children are completed; a leaf is
/// eligible when not started, not optional (unless `include_optional`), and
/// all its prerequisites are completed.
pub fn select_next_task<'a>(
    tasks: &'a [Task],
    graph: &DependencyGraph,
    include_optional: bool,
) -> Option<&'a Task> {
    if any_in_progress(tasks) {
        return None;
    }
    select_in(tasks, tasks, graph, include_optional)
}

fn select_in<'a>(
    siblings: &'a [Task],
    all: &'a [Task],
    graph: &DependencyGraph,
    include_optional: bool,
) -> Option<&'a Task> {
    for task in siblings {
        if task.status == TaskStatus::Completed {
            continue;
        }
        if task.optional && !include_optional {
            continue;
        }
        if let Some(found) = select_in(&task.children, all, graph, include_optional) {
            return Some(found);
        }
        if task.status != TaskStatus::NotStarted {
            continue;
        }
        if !task.non_optional_children_completed() {
            continue;
        }
        if !graph.prerequisites_completed(&task.id, all) {
            continue;
        }
        return Some(task);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{optional_task, task, task_with_children};

    fn forest() -> Vec<Task> {
        vec![
            task("1", "first"),
            task_with_children("2", "second", vec![task("2.1", "a"), task("2.2", "b")]),
            task("3", "third"),
        ]
    }

    fn complete(tasks: &mut [Task], id: &str) {
        crate::tasks::find_task_mut(tasks, id).expect("task").status = TaskStatus::Completed;
    }

    /// Children are selected before their parent, in document order.
    #[test]
    fn selection_order_is_depth_first_document_order() {
        let mut tasks = forest();
        let graph = DependencyGraph::build(&tasks);
        let mut order = Vec::new();
        while let Some(selected) = select_next_task(&tasks, &graph, false) {
            let id = selected.id.clone();
            order.push(id.clone());
            complete(&mut tasks, &id);
        }
        assert_eq!(order, vec!["1", "2.1", "2.2", "2", "3"]);
    }

    #[test]
    fn selection_blocks_while_any_task_in_progress() {
        let mut tasks = forest();
        tasks[0].status = TaskStatus::InProgress;
        let graph = DependencyGraph::build(&tasks);
        assert!(select_next_task(&tasks, &graph, false).is_none());
    }

    #[test]
    fn selection_skips_optional_tasks_by_default() {
        let mut tasks = vec![optional_task("1", "opt"), task("2", "real")];
        let graph = DependencyGraph::build(&tasks);
        assert_eq!(select_next_task(&tasks, &graph, false).expect("task").id, "2");

        complete(&mut tasks, "2");
        assert!(select_next_task(&tasks, &graph, false).is_none());
        assert_eq!(select_next_task(&tasks, &graph, true).expect("task").id, "1");
    }

    #[test]
    fn selection_never_returns_queued_tasks() {
        let mut tasks = forest();
        tasks[0].status = TaskStatus::Queued;
        let graph = DependencyGraph::build(&tasks);
        // "1" is queued, and it gates "2"/"3", so nothing is eligible but
        // the children of "2" whose prerequisites are met.
        let selected = select_next_task(&tasks, &graph, false).expect("task");
        assert_eq!(selected.id, "2.1");
    }

    #[test]
    fn parent_waits_for_non_optional_children() {
        let mut tasks = forest();
        complete(&mut tasks, "1");
        complete(&mut tasks, "2.1");
        let graph = DependencyGraph::build(&tasks);
        assert_eq!(select_next_task(&tasks, &graph, false).expect("task").id, "2.2");

        complete(&mut tasks, "2.2");
        assert_eq!(select_next_task(&tasks, &graph, false).expect("task").id, "2");
    }

    /// Every selection satisfies the eligibility contract, for a full run.
    #[test]
    fn selected_tasks_are_always_eligible() {
        let mut tasks = forest();
        let graph = DependencyGraph::build(&tasks);
        while let Some(selected) = select_next_task(&tasks, &graph, false) {
            assert_eq!(selected.status, TaskStatus::NotStarted);
            assert!(!selected.optional);
            assert!(graph.prerequisites_completed(&selected.id, &tasks));
            let id = selected.id.clone();
            complete(&mut tasks, &id);
        }
    }
}
