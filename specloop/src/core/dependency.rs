//! Dependency graph derived from the task tree.
//!
//! Built once at spec load from two sources:
//! - parent/child containment: each non-optional child is a prerequisite of
//!   its parent;
//! - document order between same-level siblings: an earlier sibling is an
//!   implicit prerequisite of every later one (pairs already captured by
//!   containment never occur between siblings).
//!
//! Edges only point forward in document order, so the graph is acyclic by
//! construction. Optional tasks never act as prerequisites of other tasks
//! (they may be skipped entirely), but they do have prerequisites of their
//! own.

use std::collections::{BTreeMap, BTreeSet};

use crate::tasks::{Task, TaskStatus, find_task};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    prerequisites: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Derive the graph from a document-ordered task forest.
    pub fn build(tasks: &[Task]) -> Self {
        let mut graph = DependencyGraph::default();
        graph.add_level(tasks, None);
        graph
    }

    fn add_level(&mut self, siblings: &[Task], parent_id: Option<&str>) {
        for (index, task) in siblings.iter().enumerate() {
            // Earlier non-optional siblings gate later ones.
            for earlier in &siblings[..index] {
                if !earlier.optional {
                    self.add_edge(&earlier.id, &task.id);
                }
            }
            // Non-optional children gate their parent.
            if let Some(parent) = parent_id
                && !task.optional
            {
                self.add_edge(&task.id, parent);
            }
            self.add_level(&task.children, Some(&task.id));
        }
    }

    fn add_edge(&mut self, prerequisite: &str, dependent: &str) {
        self.prerequisites
            .entry(dependent.to_string())
            .or_default()
            .insert(prerequisite.to_string());
        self.dependents
            .entry(prerequisite.to_string())
            .or_default()
            .insert(dependent.to_string());
    }

    /// Prerequisite ids of a task, in lexicographic order.
    pub fn prerequisites(&self, id: &str) -> Vec<&str> {
        self.prerequisites
            .get(id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Dependent ids of a task, in lexicographic order.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.dependents
            .get(id)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// True when every prerequisite of `id` is completed in `tasks`.
    pub fn prerequisites_completed(&self, id: &str, tasks: &[Task]) -> bool {
        let Some(set) = self.prerequisites.get(id) else {
            return true;
        };
        set.iter().all(|prerequisite| {
            find_task(tasks, prerequisite)
                .is_some_and(|task| task.status == TaskStatus::Completed)
        })
    }
}
