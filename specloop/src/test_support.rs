//! Test-only builders and scripted collaborator fakes.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::types::{CorrectionPlan, ErrorContext, ErrorKind, now_ms};
use crate::io::executor::{ExecuteRequest, ExecutionOutcome, TaskExecutor};
use crate::io::generator::{CorrectionGenerator, GenerateRequest};
use crate::manager::TaskManagerOptions;
use crate::orchestrator::StepOptions;
use crate::ralph::RalphOptions;
use crate::spec::{ParsedSpec, Property, Requirement, SpecArtifact};
use crate::tasks::Task;

/// Create a deterministic leaf task.
pub fn task(id: &str, description: &str) -> Task {
    Task {
        id: id.to_string(),
        description: description.to_string(),
        status: Default::default(),
        optional: false,
        requirement_refs: Vec::new(),
        property_refs: Vec::new(),
        children: Vec::new(),
    }
}

/// Create a task with children.
pub fn task_with_children(id: &str, description: &str, children: Vec<Task>) -> Task {
    Task {
        children,
        ..task(id, description)
    }
}

/// Create an optional leaf task.
pub fn optional_task(id: &str, description: &str) -> Task {
    let mut task = task(id, description);
    task.optional = true;
    task
}

/// The canonical fixture: tasks [1, 2 (2.1, 2.2), 3], one requirement, one
/// property.
pub fn sample_spec() -> ParsedSpec {
    let mut first = task("1", "Set up the scaffold");
    first.requirement_refs = vec!["R1".to_string()];
    let mut parent = task_with_children(
        "2",
        "Implement the core",
        vec![task("2.1", "Write the data model"), task("2.2", "Wire persistence")],
    );
    parent.property_refs = vec!["P1".to_string()];

    ParsedSpec {
        feature_name: "sample-feature".to_string(),
        requirements: vec![Requirement {
            id: "R1".to_string(),
            title: "Ordered execution".to_string(),
            acceptance_criteria: vec!["Tasks complete in document order".to_string()],
        }],
        properties: vec![Property {
            id: "P1".to_string(),
            statement: "At most one task is in progress at any instant".to_string(),
        }],
        tasks: vec![first, parent, task("3", "Document the feature")],
    }
}

/// Failure context with defaults for the uninteresting fields.
pub fn error_context(task_id: &str, message: &str) -> ErrorContext {
    ErrorContext {
        task_id: task_id.to_string(),
        message: message.to_string(),
        trace: String::new(),
        failed_test: None,
        timestamp_ms: now_ms(),
    }
}

/// A valid whole-document plan targeting the tasks artifact.
pub fn tasks_plan(attempt: u32) -> CorrectionPlan {
    CorrectionPlan {
        target: SpecArtifact::Tasks,
        replacement: "# Tasks\n\n- [ ] 1. Corrected step\n".to_string(),
        description: "rewrite the tasks artifact".to_string(),
        error_kind: ErrorKind::RuntimeError,
        attempt,
    }
}

/// Manager options rooted in a test directory.
pub fn manager_options(root: &Path) -> TaskManagerOptions {
    TaskManagerOptions {
        state_path: root.join("state.json"),
        task_file_path: root.join("tasks.md"),
    }
}

/// Ralph options rooted in a test directory.
pub fn ralph_options(root: &Path) -> RalphOptions {
    RalphOptions {
        max_attempts: 3,
        spec_dir: root.join("spec"),
        backup_dir: root.join("backups"),
        max_backups: 5,
        strict_validation: true,
        corrections_dir: root.join("corrections"),
        workdir: root.to_path_buf(),
        generator_timeout: Duration::from_secs(5),
        generator_output_limit_bytes: 10_000,
    }
}

/// Step options rooted in a test directory.
pub fn step_options(root: &Path) -> StepOptions {
    StepOptions {
        include_optional: false,
        workdir: root.to_path_buf(),
        error_path: root.join("last_error.json"),
        executor_timeout: Duration::from_secs(5),
        executor_output_limit_bytes: 10_000,
    }
}

/// Executor returning scripted outcomes without spawning processes.
pub struct ScriptedExecutor {
    outcomes: RefCell<VecDeque<ExecutionOutcome>>,
    always_success: bool,
}

impl ScriptedExecutor {
    pub fn always_success() -> Self {
        Self {
            outcomes: RefCell::new(VecDeque::new()),
            always_success: true,
        }
    }

    pub fn with_outcomes(outcomes: Vec<ExecutionOutcome>) -> Self {
        Self {
            outcomes: RefCell::new(outcomes.into()),
            always_success: false,
        }
    }
}

impl TaskExecutor for ScriptedExecutor {
    fn execute(&self, _request: &ExecuteRequest) -> Result<ExecutionOutcome> {
        if self.always_success {
            return Ok(ExecutionOutcome::Success);
        }
        self.outcomes
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted executor has no outcome left"))
    }
}

/// Generator returning scripted plans, counting invocations.
pub struct ScriptedGenerator {
    plans: RefCell<VecDeque<Result<CorrectionPlan, String>>>,
    calls: Cell<u32>,
}

impl ScriptedGenerator {
    pub fn with_plans(plans: Vec<Result<CorrectionPlan, String>>) -> Self {
        Self {
            plans: RefCell::new(plans.into()),
            calls: Cell::new(0),
        }
    }

    /// Number of times `generate` was invoked.
    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl CorrectionGenerator for ScriptedGenerator {
    fn generate(&self, _request: &GenerateRequest) -> Result<CorrectionPlan> {
        self.calls.set(self.calls.get() + 1);
        match self.plans.borrow_mut().pop_front() {
            Some(Ok(plan)) => Ok(plan),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted generator has no plan left")),
        }
    }
}
