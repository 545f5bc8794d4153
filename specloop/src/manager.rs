//! Task manager: owns the task tree, its durable state, and all transitions.
//!
//! Every mutation routes through one validated-transition path: check the
//! table, mutate in memory, rewrite the human-readable task file, notify
//! listeners, persist state. The task file and state are rewritten on every
//! committed transition; on crash recovery the task file is re-rendered
//! from the recovered state so the pair can never stay divergent.

use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::core::dependency::DependencyGraph;
use crate::core::invariants::validate_spec;
use crate::core::selector;
use crate::core::transition::validate_transition;
use crate::core::types::{TaskEvent, now_ms};
use crate::io::state_store::{OrchestratorState, load_or_recover, write_state};
use crate::io::task_file::write_task_file;
use crate::spec::ParsedSpec;
use crate::tasks::{Task, TaskStatus, find_task, find_task_mut, task_ids, walk_tasks, walk_tasks_mut};

/// Callback invoked after every committed transition.
pub type TaskListener = Box<dyn Fn(&TaskEvent)>;

/// Construction options; paths are injected for testability.
#[derive(Debug, Clone)]
pub struct TaskManagerOptions {
    pub state_path: PathBuf,
    pub task_file_path: PathBuf,
}

pub struct TaskManager {
    spec: ParsedSpec,
    graph: DependencyGraph,
    state: OrchestratorState,
    options: TaskManagerOptions,
    listeners: Vec<TaskListener>,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("spec", &self.spec)
            .field("graph", &self.graph)
            .field("state", &self.state)
            .field("options", &self.options)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl TaskManager {
    /// Load a parsed spec, recover (or create) durable state, and persist
    /// the initial snapshot.
    ///
    /// Rejects the spec outright when a task references a nonexistent
    /// requirement or property.
    pub fn load(spec: ParsedSpec, options: TaskManagerOptions) -> Result<Self> {
        let errors = validate_spec(&spec);
        if !errors.is_empty() {
            return Err(anyhow!("invalid spec: {}", errors.join("; ")));
        }

        let graph = DependencyGraph::build(&spec.tasks);
        let known: BTreeSet<String> = task_ids(&spec.tasks).into_iter().collect();
        let state = load_or_recover(&options.state_path, &spec.feature_name, &known)
            .context("recover orchestrator state")?;

        let mut manager = Self {
            spec,
            graph,
            state,
            options,
            listeners: Vec::new(),
        };
        manager.rehydrate_statuses();
        manager.write_task_file()?;
        manager.persist()?;
        info!(
            spec_id = %manager.state.spec_id,
            tasks = known.len(),
            "task manager loaded"
        );
        Ok(manager)
    }

    /// Rebuild in-memory statuses from durable state. Queued is deliberately
    /// not durable: a crash between queue and start falls back to
    /// not_started.
    fn rehydrate_statuses(&mut self) {
        let completed = self.state.completed.clone();
        let current = self.state.current_task.clone();
        walk_tasks_mut(&mut self.spec.tasks, &mut |task| {
            task.status = if completed.contains(&task.id) {
                TaskStatus::Completed
            } else if current.as_deref() == Some(task.id.as_str()) {
                TaskStatus::InProgress
            } else {
                TaskStatus::NotStarted
            };
        });
    }

    pub fn spec(&self) -> &ParsedSpec {
        &self.spec
    }

    pub fn tasks(&self) -> &[Task] {
        &self.spec.tasks
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// The single in-flight task id, if any.
    pub fn current_task(&self) -> Option<&str> {
        self.state.current_task.as_deref()
    }

    pub fn subscribe(&mut self, listener: TaskListener) {
        self.listeners.push(listener);
    }

    pub fn select_next_task(&self, include_optional: bool) -> Option<&Task> {
        selector::select_next_task(&self.spec.tasks, &self.graph, include_optional)
    }

    /// True when every non-optional task is completed.
    pub fn is_complete(&self) -> bool {
        let mut complete = true;
        walk_tasks(&self.spec.tasks, &mut |task| {
            if !task.optional && task.status != TaskStatus::Completed {
                complete = false;
            }
        });
        complete
    }

    pub fn queue_task(&mut self, id: &str) -> Result<()> {
        self.apply_transition(id, TaskStatus::Queued)
    }

    /// Start a queued task. Fails loudly when prerequisites are incomplete
    /// or another task is already in flight; both indicate caller bugs.
    pub fn start_task(&mut self, id: &str) -> Result<()> {
        if !self.graph.prerequisites_completed(id, &self.spec.tasks) {
            return Err(anyhow!(
                "cannot start task '{}': prerequisites incomplete ({})",
                id,
                self.graph.prerequisites(id).join(", ")
            ));
        }
        self.apply_transition(id, TaskStatus::InProgress)
    }

    /// Complete the in-flight task. A parent completes only when all its
    /// non-optional children already have.
    pub fn complete_task(&mut self, id: &str) -> Result<()> {
        let task = find_task(&self.spec.tasks, id).ok_or_else(|| anyhow!("unknown task '{id}'"))?;
        if !task.non_optional_children_completed() {
            return Err(anyhow!(
                "cannot complete task '{}': non-optional children incomplete",
                id
            ));
        }
        self.apply_transition(id, TaskStatus::Completed)
    }

    /// Reset an in-flight task after a correction so it can be retried.
    pub fn reset_task(&mut self, id: &str) -> Result<()> {
        self.apply_transition(id, TaskStatus::NotStarted)
    }

    fn apply_transition(&mut self, id: &str, to: TaskStatus) -> Result<()> {
        let task = find_task(&self.spec.tasks, id).ok_or_else(|| anyhow!("unknown task '{id}'"))?;
        let from = task.status;
        validate_transition(id, from, to).map_err(anyhow::Error::new)?;

        if to == TaskStatus::InProgress
            && let Some(current) = self.state.current_task.as_deref()
            && current != id
        {
            return Err(anyhow!(
                "cannot start task '{id}': task '{current}' is already in progress"
            ));
        }

        find_task_mut(&mut self.spec.tasks, id)
            .expect("task existence checked above")
            .status = to;

        match to {
            TaskStatus::InProgress => self.state.current_task = Some(id.to_string()),
            TaskStatus::Completed => {
                self.state.completed.insert(id.to_string());
                if self.state.current_task.as_deref() == Some(id) {
                    self.state.current_task = None;
                }
            }
            TaskStatus::NotStarted => {
                self.state.completed.remove(id);
                if self.state.current_task.as_deref() == Some(id) {
                    self.state.current_task = None;
                }
            }
            TaskStatus::Queued => {}
        }

        self.write_task_file()?;
        self.notify(&TaskEvent {
            task_id: id.to_string(),
            previous_status: from,
            new_status: to,
            timestamp_ms: now_ms(),
        });
        self.persist()?;
        debug!(task_id = %id, from = from.as_str(), to = to.as_str(), "transition committed");
        Ok(())
    }

    /// Listener failures are isolated: the transition is already committed
    /// in memory and the task file, so a panicking subscriber only earns a
    /// warning.
    fn notify(&self, event: &TaskEvent) {
        for listener in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(task_id = %event.task_id, "status listener panicked; event dropped");
            }
        }
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.state.attempts.get(id).copied().unwrap_or(0)
    }

    /// Increment and persist the correction attempt counter.
    pub fn increment_attempts(&mut self, id: &str) -> Result<u32> {
        self.ensure_known(id)?;
        let counter = self.state.attempts.entry(id.to_string()).or_insert(0);
        *counter += 1;
        let value = *counter;
        self.persist()?;
        Ok(value)
    }

    /// Reset the correction attempt counter (the external escalation
    /// recovery action). Idempotent.
    pub fn reset_attempts(&mut self, id: &str) -> Result<()> {
        self.ensure_known(id)?;
        self.state.attempts.remove(id);
        self.persist()
    }

    /// Record optional tasks that were never completed as skipped.
    pub fn record_skipped_optional(&mut self) -> Result<Vec<String>> {
        let mut skipped = Vec::new();
        walk_tasks(&self.spec.tasks, &mut |task| {
            if task.optional && task.status != TaskStatus::Completed {
                skipped.push(task.id.clone());
            }
        });
        for id in &skipped {
            self.state.skipped_optional.insert(id.clone());
        }
        self.persist()?;
        Ok(skipped)
    }

    fn ensure_known(&self, id: &str) -> Result<()> {
        if find_task(&self.spec.tasks, id).is_none() {
            return Err(anyhow!("unknown task '{id}'"));
        }
        Ok(())
    }

    fn write_task_file(&self) -> Result<()> {
        write_task_file(
            &self.options.task_file_path,
            &self.spec.feature_name,
            &self.spec.tasks,
        )
    }

    fn persist(&mut self) -> Result<()> {
        write_state(&self.options.state_path, &self.state)
    }
}
