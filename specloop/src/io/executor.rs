//! Executor abstraction for task execution.
//!
//! The [`TaskExecutor`] trait decouples the orchestrator from the actual
//! execution backend (a test runner, build command, or agent). Tests use
//! scripted executors that return predetermined outcomes without spawning
//! processes.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ErrorContext, now_ms};
use crate::io::process::run_command_with_timeout;

/// Parameters for one task execution.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    /// Working directory for the executor process.
    pub workdir: PathBuf,
    pub task_id: String,
    pub description: String,
    /// Path where the executor may write a structured `ErrorContext` JSON
    /// on failure. Synthesized from process output when absent.
    pub error_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Result of one task execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success,
    Failed(ErrorContext),
}

/// Abstraction over task execution backends.
pub trait TaskExecutor {
    fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionOutcome>;
}

/// Executor that spawns a configured command with the task id appended.
pub struct CommandExecutor {
    pub command: Vec<String>,
}

impl TaskExecutor for CommandExecutor {
    #[instrument(skip_all, fields(task_id = %request.task_id, timeout_secs = request.timeout.as_secs()))]
    fn execute(&self, request: &ExecuteRequest) -> Result<ExecutionOutcome> {
        let program = self
            .command
            .first()
            .ok_or_else(|| anyhow!("executor command must not be empty"))?;
        info!(command = %program, "executing task");

        // Drop any stale structured error from a previous run.
        if request.error_path.exists() {
            let _ = fs::remove_file(&request.error_path);
        }

        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..])
            .arg(&request.task_id)
            .current_dir(&request.workdir);

        let output =
            run_command_with_timeout(cmd, None, request.timeout, request.output_limit_bytes)
                .context("run task executor")?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "task execution timed out");
            return Ok(ExecutionOutcome::Failed(ErrorContext {
                task_id: request.task_id.clone(),
                message: format!(
                    "task '{}' timed out after {}s",
                    request.task_id,
                    request.timeout.as_secs()
                ),
                trace: output.combined_text(),
                failed_test: None,
                timestamp_ms: now_ms(),
            }));
        }
        if output.status.success() {
            debug!("task execution succeeded");
            return Ok(ExecutionOutcome::Success);
        }

        // Prefer the executor's own structured error when it produced one.
        if let Some(context) = read_structured_error(request) {
            return Ok(ExecutionOutcome::Failed(context));
        }

        let message = String::from_utf8_lossy(&output.stderr)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "task execution failed with status {:?}",
                    output.status.code()
                )
            });
        Ok(ExecutionOutcome::Failed(ErrorContext {
            task_id: request.task_id.clone(),
            message,
            trace: output.combined_text(),
            failed_test: None,
            timestamp_ms: now_ms(),
        }))
    }
}

fn read_structured_error(request: &ExecuteRequest) -> Option<ErrorContext> {
    if !request.error_path.exists() {
        return None;
    }
    let contents = fs::read_to_string(&request.error_path).ok()?;
    match serde_json::from_str::<ErrorContext>(&contents) {
        Ok(mut context) => {
            if context.task_id.is_empty() {
                context.task_id = request.task_id.clone();
            }
            if context.timestamp_ms == 0 {
                context.timestamp_ms = now_ms();
            }
            Some(context)
        }
        Err(err) => {
            warn!(path = %request.error_path.display(), err = %err, "ignoring malformed error file");
            None
        }
    }
}
