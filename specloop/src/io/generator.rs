//! Correction generator abstraction.
//!
//! The generator is an opaque external collaborator (a human workflow, a
//! rule engine, or a model). The [`CommandGenerator`] adapter renders a
//! correction brief, feeds it to a configured command on stdin, and reads
//! the resulting plan from the provided output path. Tests use scripted
//! generators.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, context};
use tracing::{debug, info, instrument};

use crate::core::types::{CorrectionPlan, ErrorAnalysis, ErrorContext};
use crate::io::process::run_command_with_timeout;

const CORRECTION_TEMPLATE: &str = include_str!("prompts/correction.md");

/// Parameters for one correction generation.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub analysis: ErrorAnalysis,
    pub context: ErrorContext,
    /// Directory holding the spec artifacts.
    pub spec_dir: PathBuf,
    /// Absolute path of the artifact the correction targets.
    pub artifact_path: PathBuf,
    pub attempt: u32,
    pub max_attempts: u32,
    /// Path where the generator must write its plan JSON.
    pub output_path: PathBuf,
    /// Working directory for the generator process.
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Abstraction over correction generation backends.
pub trait CorrectionGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<CorrectionPlan>;
}

/// Generator that pipes a rendered brief to a configured command.
pub struct CommandGenerator {
    pub command: Vec<String>,
}

impl CorrectionGenerator for CommandGenerator {
    #[instrument(skip_all, fields(task_id = %request.context.task_id, attempt = request.attempt))]
    fn generate(&self, request: &GenerateRequest) -> Result<CorrectionPlan> {
        let program = self
            .command
            .first()
            .ok_or_else(|| anyhow!("generator command must not be empty"))?;
        info!(command = %program, "requesting correction");

        let brief = render_brief(request)?;
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create plan dir {}", parent.display()))?;
        }

        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..])
            .arg(&request.output_path)
            .current_dir(&request.workdir);

        let output = run_command_with_timeout(
            cmd,
            Some(brief.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .context("run correction generator")?;

        if output.timed_out {
            return Err(anyhow!(
                "correction generator timed out after {:?}",
                request.timeout
            ));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "correction generator failed with status {:?}",
                output.status.code()
            ));
        }

        load_plan(request)
    }
}

/// Render the correction brief fed to the generator.
pub fn render_brief(request: &GenerateRequest) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("correction", CORRECTION_TEMPLATE)
        .expect("correction template should be valid");
    let template = env.get_template("correction")?;
    let rendered = template.render(context! {
        analysis => request.analysis,
        context => request.context,
        attempt => request.attempt,
        max_attempts => request.max_attempts,
        artifact_path => request.artifact_path.display().to_string(),
        output_path => request.output_path.display().to_string(),
    })?;
    Ok(rendered)
}

fn load_plan(request: &GenerateRequest) -> Result<CorrectionPlan> {
    if !request.output_path.exists() {
        return Err(anyhow!(
            "missing generator output {}",
            request.output_path.display()
        ));
    }
    let contents = fs::read_to_string(&request.output_path)
        .with_context(|| format!("read plan {}", request.output_path.display()))?;
    let plan: CorrectionPlan = serde_json::from_str(&contents)
        .with_context(|| format!("parse plan {}", request.output_path.display()))?;
    debug!(target = plan.target.as_str(), "parsed correction plan");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analyzer::analyze;
    use crate::test_support::error_context;

    fn sample_request(temp: &tempfile::TempDir) -> GenerateRequest {
        let context = error_context("2.3", "TypeError: Cannot read property 'x' of undefined");
        let analysis = analyze(&context);
        GenerateRequest {
            artifact_path: temp.path().join("spec").join(analysis.target.file_name()),
            analysis,
            context,
            spec_dir: temp.path().join("spec"),
            attempt: 1,
            max_attempts: 3,
            output_path: temp.path().join("plan.json"),
            workdir: temp.path().to_path_buf(),
            timeout: Duration::from_secs(5),
            output_limit_bytes: 10_000,
        }
    }

    #[test]
    fn brief_includes_classification_and_contract() {
        let temp = tempfile::tempdir().expect("tempdir");
        let brief = render_brief(&sample_request(&temp)).expect("render");
        assert!(brief.contains("task: 2.3"));
        assert!(brief.contains("classified as: runtime_error"));
        assert!(brief.contains("attempt: 1 of 3"));
        assert!(brief.contains("TypeError"));
        assert!(brief.contains("plan.json"));
    }

    #[test]
    fn command_generator_reads_written_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = sample_request(&temp);
        let plan_json = r##"{"target":"tasks","replacement":"# Tasks\n\n- [ ] 1. redo\n","description":"rewrite","error_kind":"runtime_error","attempt":1}"##;
        // The adapter appends the output path as the final argument.
        let script = format!("cat > /dev/null; printf '%s' '{}' > \"$1\"", plan_json);
        let generator = CommandGenerator {
            command: vec!["sh".to_string(), "-c".to_string(), script, "sh".to_string()],
        };
        let plan = generator.generate(&request).expect("generate");
        assert_eq!(plan.description, "rewrite");
        assert_eq!(plan.attempt, 1);
    }

    #[test]
    fn missing_plan_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = sample_request(&temp);
        let generator = CommandGenerator {
            command: vec!["sh".to_string(), "-c".to_string(), "true".to_string(), "sh".to_string()],
        };
        let err = generator.generate(&request).expect_err("expected failure");
        assert!(err.to_string().contains("missing generator output"));
    }
}
