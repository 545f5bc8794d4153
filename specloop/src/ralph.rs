//! Bounded self-correction coordinator.
//!
//! One correction round: classify the failure, ask the external generator
//! for a replacement document, commit it through the applier, reset the
//! failing task for retry. Rounds are capped per task; hitting the cap is a
//! policy outcome (escalate to a human), not an error.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::core::analyzer::analyze;
use crate::core::types::{ErrorAnalysis, ErrorContext, ErrorKind, now_ms};
use crate::io::applier::{ApplyOptions, apply_correction};
use crate::io::generator::{CorrectionGenerator, GenerateRequest};
use crate::manager::TaskManager;

/// Configuration for the correction loop.
#[derive(Debug, Clone)]
pub struct RalphOptions {
    pub max_attempts: u32,
    pub spec_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub max_backups: usize,
    pub strict_validation: bool,
    /// Per-attempt plan files land under `<corrections_dir>/<task>/<n>/`.
    pub corrections_dir: PathBuf,
    pub workdir: PathBuf,
    pub generator_timeout: Duration,
    pub generator_output_limit_bytes: usize,
}

/// One recorded correction attempt, surfaced verbatim on escalation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub kind: ErrorKind,
    pub applied: bool,
    pub error: Option<String>,
    pub timestamp_ms: u64,
}

/// Outcome of one `execute_correction` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// The plan was applied and the task reset for retry.
    Applied {
        attempt: u32,
        analysis: ErrorAnalysis,
        file_path: PathBuf,
    },
    /// A step failed; `exhausted` is set exactly when this was the final
    /// permitted attempt.
    Failed {
        attempt: u32,
        error: String,
        exhausted: bool,
    },
    /// The cap was already reached; nothing ran and nothing mutated.
    Exhausted { attempts: u32 },
}

impl CorrectionOutcome {
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            CorrectionOutcome::Exhausted { .. }
                | CorrectionOutcome::Failed {
                    exhausted: true,
                    ..
                }
        )
    }
}

pub struct RalphLoop {
    options: RalphOptions,
    history: BTreeMap<String, Vec<AttemptRecord>>,
}

impl RalphLoop {
    pub fn new(options: RalphOptions) -> Self {
        Self {
            options,
            history: BTreeMap::new(),
        }
    }

    /// Correction attempts recorded for a task, oldest first.
    pub fn history(&self, task_id: &str) -> &[AttemptRecord] {
        self.history
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Run one bounded correction round for a failed task.
    ///
    /// The attempt counter is read first: if incrementing it would exceed
    /// the cap, the call returns `Exhausted` immediately without invoking
    /// the generator or mutating anything. A successful correction is never
    /// exhausted, even on the final permitted attempt.
    pub fn execute_correction<G: CorrectionGenerator>(
        &mut self,
        manager: &mut TaskManager,
        generator: &G,
        context: &ErrorContext,
    ) -> Result<CorrectionOutcome> {
        let task_id = context.task_id.clone();
        let attempts = manager.attempts(&task_id);
        if attempts >= self.options.max_attempts {
            info!(task_id = %task_id, attempts, "correction attempts exhausted, escalating");
            return Ok(CorrectionOutcome::Exhausted { attempts });
        }

        let attempt = manager
            .increment_attempts(&task_id)
            .context("increment correction attempts")?;
        let analysis = analyze(context);
        debug!(
            task_id = %task_id,
            attempt,
            kind = analysis.kind.as_str(),
            target = analysis.target.as_str(),
            confidence = analysis.confidence,
            "failure classified"
        );

        match self.run_attempt(manager, generator, context, &analysis, attempt) {
            Ok(file_path) => {
                self.record(&task_id, attempt, analysis.kind, true, None);
                info!(task_id = %task_id, attempt, "correction applied, task reset");
                Ok(CorrectionOutcome::Applied {
                    attempt,
                    analysis,
                    file_path,
                })
            }
            Err(err) => {
                let error = format!("{err:#}");
                let exhausted = attempt >= self.options.max_attempts;
                warn!(task_id = %task_id, attempt, exhausted, error = %error, "correction failed");
                self.record(&task_id, attempt, analysis.kind, false, Some(error.clone()));
                Ok(CorrectionOutcome::Failed {
                    attempt,
                    error,
                    exhausted,
                })
            }
        }
    }

    fn run_attempt<G: CorrectionGenerator>(
        &self,
        manager: &mut TaskManager,
        generator: &G,
        context: &ErrorContext,
        analysis: &ErrorAnalysis,
        attempt: u32,
    ) -> Result<PathBuf> {
        let output_path = self
            .options
            .corrections_dir
            .join(&context.task_id)
            .join(attempt.to_string())
            .join("plan.json");

        let plan = generator
            .generate(&GenerateRequest {
                analysis: analysis.clone(),
                context: context.clone(),
                spec_dir: self.options.spec_dir.clone(),
                artifact_path: self.options.spec_dir.join(analysis.target.file_name()),
                attempt,
                max_attempts: self.options.max_attempts,
                output_path,
                workdir: self.options.workdir.clone(),
                timeout: self.options.generator_timeout,
                output_limit_bytes: self.options.generator_output_limit_bytes,
            })
            .context("generate correction")?;

        let report = apply_correction(
            &plan,
            &ApplyOptions {
                spec_dir: self.options.spec_dir.clone(),
                backup_dir: self.options.backup_dir.clone(),
                max_backups: self.options.max_backups,
                max_attempts: self.options.max_attempts,
                strict_validation: self.options.strict_validation,
            },
        );
        if !report.success {
            return Err(anyhow!(
                "correction rejected: {}",
                report.error.unwrap_or_else(|| "unspecified".to_string())
            ));
        }

        manager
            .reset_task(&context.task_id)
            .context("reset task for retry")?;
        Ok(report.file_path)
    }

    fn record(
        &mut self,
        task_id: &str,
        attempt: u32,
        kind: ErrorKind,
        applied: bool,
        error: Option<String>,
    ) {
        self.history
            .entry(task_id.to_string())
            .or_default()
            .push(AttemptRecord {
                attempt,
                kind,
                applied,
                error,
                timestamp_ms: now_ms(),
            });
    }
}
