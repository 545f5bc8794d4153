//! Thin orchestration shell: select, execute, correct, advance.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::core::types::ErrorContext;
use crate::io::executor::{ExecuteRequest, ExecutionOutcome, TaskExecutor};
use crate::io::generator::CorrectionGenerator;
use crate::manager::TaskManager;
use crate::ralph::{AttemptRecord, CorrectionOutcome, RalphLoop};

/// Options shared by `run_step` and `run_loop`.
#[derive(Debug, Clone)]
pub struct StepOptions {
    pub include_optional: bool,
    pub workdir: PathBuf,
    /// Path the executor may use for structured error output.
    pub error_path: PathBuf,
    pub executor_timeout: Duration,
    pub executor_output_limit_bytes: usize,
}

/// Result of one orchestration round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The task executed and completed.
    Completed { task_id: String },
    /// Execution failed, a correction was applied, the task was reset.
    Corrected { task_id: String, attempt: u32 },
    /// Execution failed and the correction round failed too, but attempts
    /// remain; the task stays in flight and the next round retries.
    CorrectionFailed {
        task_id: String,
        attempt: u32,
        error: String,
    },
    /// Attempts are exhausted; a human must intervene.
    Escalated {
        task_id: String,
        context: ErrorContext,
        attempts: u32,
        history: Vec<AttemptRecord>,
    },
    /// Nothing is eligible; every non-optional task is done.
    AllDone,
}

/// Terminal result of `run_loop`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Complete {
        completed: usize,
        skipped_optional: Vec<String>,
    },
    Escalated {
        task_id: String,
        context: ErrorContext,
        attempts: u32,
        history: Vec<AttemptRecord>,
    },
}

/// Execute one round: resume or select a task, run it, and on failure hand
/// the error context to the correction loop.
pub fn run_step<E: TaskExecutor, G: CorrectionGenerator>(
    manager: &mut TaskManager,
    ralph: &mut RalphLoop,
    executor: &E,
    generator: &G,
    options: &StepOptions,
) -> Result<StepOutcome> {
    // Resume a task left in flight by a crash; otherwise pick the next one.
    let task_id = match manager.current_task() {
        Some(id) => {
            info!(task_id = %id, "resuming in-flight task");
            id.to_string()
        }
        None => match manager.select_next_task(options.include_optional) {
            Some(task) => {
                let id = task.id.clone();
                manager.queue_task(&id).context("queue selected task")?;
                manager.start_task(&id).context("start selected task")?;
                id
            }
            None => return Ok(StepOutcome::AllDone),
        },
    };

    let description = crate::tasks::find_task(manager.tasks(), &task_id)
        .map(|task| task.description.clone())
        .unwrap_or_default();

    let request = ExecuteRequest {
        workdir: options.workdir.clone(),
        task_id: task_id.clone(),
        description,
        error_path: options.error_path.clone(),
        timeout: options.executor_timeout,
        output_limit_bytes: options.executor_output_limit_bytes,
    };

    match executor.execute(&request).context("execute task")? {
        ExecutionOutcome::Success => {
            manager.complete_task(&task_id).context("complete task")?;
            info!(task_id = %task_id, "task completed");
            Ok(StepOutcome::Completed { task_id })
        }
        ExecutionOutcome::Failed(context) => {
            warn!(task_id = %task_id, message = %context.message, "task failed");
            match ralph.execute_correction(manager, generator, &context)? {
                CorrectionOutcome::Applied { attempt, .. } => {
                    Ok(StepOutcome::Corrected { task_id, attempt })
                }
                CorrectionOutcome::Failed {
                    attempt,
                    error,
                    exhausted: false,
                } => Ok(StepOutcome::CorrectionFailed {
                    task_id,
                    attempt,
                    error,
                }),
                CorrectionOutcome::Failed {
                    exhausted: true, ..
                }
                | CorrectionOutcome::Exhausted { .. } => {
                    let attempts = manager.attempts(&task_id);
                    let history = ralph.history(&task_id).to_vec();
                    Ok(StepOutcome::Escalated {
                        task_id,
                        context,
                        attempts,
                        history,
                    })
                }
            }
        }
    }
}

/// Run rounds until the tree completes or a task escalates.
///
/// Escalation halts the loop and surfaces the full error context plus
/// attempt history verbatim; no further corrections run for that task until
/// its counter is reset externally.
pub fn run_loop<E, G, F>(
    manager: &mut TaskManager,
    ralph: &mut RalphLoop,
    executor: &E,
    generator: &G,
    options: &StepOptions,
    mut on_step: F,
) -> Result<RunOutcome>
where
    E: TaskExecutor,
    G: CorrectionGenerator,
    F: FnMut(&StepOutcome),
{
    loop {
        let step = run_step(manager, ralph, executor, generator, options)?;
        on_step(&step);
        match step {
            StepOutcome::AllDone => {
                let skipped_optional = manager
                    .record_skipped_optional()
                    .context("record skipped optional tasks")?;
                return Ok(RunOutcome::Complete {
                    completed: manager.state().completed.len(),
                    skipped_optional,
                });
            }
            StepOutcome::Escalated {
                task_id,
                context,
                attempts,
                history,
            } => {
                return Ok(RunOutcome::Escalated {
                    task_id,
                    context,
                    attempts,
                    history,
                });
            }
            StepOutcome::Completed { .. }
            | StepOutcome::Corrected { .. }
            | StepOutcome::CorrectionFailed { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::TaskManager;
    use crate::test_support::{
        ScriptedExecutor, ScriptedGenerator, error_context, manager_options, ralph_options,
        sample_spec, step_options, tasks_plan,
    };

    fn loaded(temp: &tempfile::TempDir) -> (TaskManager, RalphLoop, StepOptions) {
        let manager = TaskManager::load(sample_spec(), manager_options(temp.path())).expect("load");
        let ralph = RalphLoop::new(ralph_options(temp.path()));
        (manager, ralph, step_options(temp.path()))
    }

    /// A clean run completes every non-optional task in selection order.
    #[test]
    fn loop_completes_all_tasks() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut manager, mut ralph, options) = loaded(&temp);
        let executor = ScriptedExecutor::always_success();
        let generator = ScriptedGenerator::with_plans(Vec::new());

        let mut completed_order = Vec::new();
        let outcome = run_loop(
            &mut manager,
            &mut ralph,
            &executor,
            &generator,
            &options,
            |step| {
                if let StepOutcome::Completed { task_id } = step {
                    completed_order.push(task_id.clone());
                }
            },
        )
        .expect("loop");

        assert_eq!(completed_order, vec!["1", "2.1", "2.2", "2", "3"]);
        assert_eq!(
            outcome,
            RunOutcome::Complete {
                completed: 5,
                skipped_optional: Vec::new(),
            }
        );
        assert_eq!(generator.calls(), 0);
    }

    /// One failure is corrected and the task re-executes to completion.
    #[test]
    fn loop_corrects_a_failure_and_retries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut manager, mut ralph, options) = loaded(&temp);
        let executor = ScriptedExecutor::with_outcomes(vec![
            ExecutionOutcome::Failed(error_context(
                "1",
                "TypeError: Cannot read property 'x' of undefined",
            )),
            ExecutionOutcome::Success,
            ExecutionOutcome::Success,
            ExecutionOutcome::Success,
            ExecutionOutcome::Success,
            ExecutionOutcome::Success,
        ]);
        let generator = ScriptedGenerator::with_plans(vec![Ok(tasks_plan(1))]);

        let mut corrected = Vec::new();
        let outcome = run_loop(
            &mut manager,
            &mut ralph,
            &executor,
            &generator,
            &options,
            |step| {
                if let StepOutcome::Corrected { task_id, attempt } = step {
                    corrected.push((task_id.clone(), *attempt));
                }
            },
        )
        .expect("loop");

        assert_eq!(corrected, vec![("1".to_string(), 1)]);
        assert!(matches!(outcome, RunOutcome::Complete { completed: 5, .. }));
        // The counter is not auto-reset on success.
        assert_eq!(manager.attempts("1"), 1);
    }

    /// Persistent failures exhaust the cap and escalate with history.
    #[test]
    fn loop_escalates_after_exhaustion() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut manager, mut ralph, options) = loaded(&temp);
        let failure = || {
            ExecutionOutcome::Failed(error_context("1", "assertion failed: expected 2 but got 3"))
        };
        let executor =
            ScriptedExecutor::with_outcomes(vec![failure(), failure(), failure(), failure()]);
        // Corrections apply but the task keeps failing.
        let generator = ScriptedGenerator::with_plans(vec![
            Ok(tasks_plan(1)),
            Ok(tasks_plan(2)),
            Ok(tasks_plan(3)),
        ]);

        let outcome = run_loop(
            &mut manager,
            &mut ralph,
            &executor,
            &generator,
            &options,
            |_| {},
        )
        .expect("loop");

        let RunOutcome::Escalated {
            task_id,
            context,
            attempts,
            history,
        } = outcome
        else {
            panic!("expected escalation");
        };
        assert_eq!(task_id, "1");
        assert_eq!(attempts, 3);
        assert_eq!(history.len(), 3);
        // The surfaced context is the verbatim executor failure.
        assert!(context.message.contains("assertion failed"));
        assert_eq!(generator.calls(), 3);
    }

    /// A recovered in-flight task resumes without a fresh selection.
    #[test]
    fn step_resumes_recovered_in_flight_task() {
        let temp = tempfile::tempdir().expect("tempdir");
        let options = manager_options(temp.path());
        {
            let mut manager = TaskManager::load(sample_spec(), options.clone()).expect("load");
            manager.queue_task("1").expect("queue");
            manager.start_task("1").expect("start");
        }

        let mut manager = TaskManager::load(sample_spec(), options).expect("reload");
        let mut ralph = RalphLoop::new(ralph_options(temp.path()));
        let executor = ScriptedExecutor::always_success();
        let generator = ScriptedGenerator::with_plans(Vec::new());

        let step = run_step(
            &mut manager,
            &mut ralph,
            &executor,
            &generator,
            &step_options(temp.path()),
        )
        .expect("step");
        assert_eq!(
            step,
            StepOutcome::Completed {
                task_id: "1".to_string()
            }
        );
    }
}
