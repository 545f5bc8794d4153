//! Validated, atomic application of correction plans.
//!
//! Anticipated failures (malformed plan, content that fails the artifact
//! schema) are reported in the returned [`ApplyReport`], never raised.
//! I/O surprises during the atomic write are folded into the report as
//! well, so `apply_correction` has no error path of its own. Either way a
//! failed application leaves the target file byte-identical.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, warn};

use crate::core::artifact::validate_artifact;
use crate::core::types::CorrectionPlan;
use crate::io::file_store::{
    BackupConfig, WriteOptions, WriteOutcome, atomic_write_with_backup,
};

/// Options for applying a correction.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub spec_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub max_backups: usize,
    pub max_attempts: u32,
    pub strict_validation: bool,
}

/// Structured result of one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub success: bool,
    pub file_path: PathBuf,
    pub backup_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl ApplyReport {
    fn applied(file_path: PathBuf, backup_path: Option<PathBuf>) -> Self {
        Self {
            success: true,
            file_path,
            backup_path,
            error: None,
        }
    }

    fn rejected(file_path: PathBuf, error: String) -> Self {
        Self {
            success: false,
            file_path,
            backup_path: None,
            error: Some(error),
        }
    }
}

/// Validate and atomically commit a correction plan.
pub fn apply_correction(plan: &CorrectionPlan, options: &ApplyOptions) -> ApplyReport {
    let file_path = options.spec_dir.join(plan.target.file_name());

    let mut errors = validate_plan(plan, options.max_attempts);
    errors.extend(validate_artifact(
        plan.target,
        &plan.replacement,
        options.strict_validation,
    ));
    if !errors.is_empty() {
        debug!(target = plan.target.as_str(), "correction plan rejected");
        return ApplyReport::rejected(file_path, errors.join("; "));
    }

    // Re-run the content check at commit time inside the file store, so a
    // caller bypassing the pre-check above still cannot land bad content.
    let target = plan.target;
    let strict = options.strict_validation;
    let commit_guard = move |content: &str| -> Result<(), String> {
        let errors = validate_artifact(target, content, strict);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    };

    let write_options = WriteOptions {
        validate: Some(&commit_guard),
        create_dirs: true,
    };
    let backup = BackupConfig {
        backup_dir: options.backup_dir.clone(),
        max_backups: options.max_backups,
    };

    match atomic_write_with_backup(&file_path, &plan.replacement, &write_options, &backup) {
        Ok(WriteOutcome::Written { backup_path }) => {
            debug!(path = %file_path.display(), "correction applied");
            ApplyReport::applied(file_path, backup_path)
        }
        Ok(WriteOutcome::Rejected { reason }) => ApplyReport::rejected(file_path, reason),
        Err(err) => {
            warn!(path = %file_path.display(), err = %err, "correction write failed");
            ApplyReport::rejected(file_path, format!("write failed: {err:#}"))
        }
    }
}

fn validate_plan(plan: &CorrectionPlan, max_attempts: u32) -> Vec<String> {
    let mut errors = Vec::new();
    if plan.replacement.trim().is_empty() {
        errors.push("replacement text must not be empty".to_string());
    }
    if plan.description.trim().is_empty() {
        errors.push("correction description must not be empty".to_string());
    }
    if plan.attempt == 0 || plan.attempt > max_attempts {
        errors.push(format!(
            "attempt {} outside [1, {}]",
            plan.attempt, max_attempts
        ));
    }
    errors
}

/// Re-read the target and compare against the plan, normalizing line
/// endings. Extra assurance for tests and post-apply checks.
pub fn verify_applied(plan: &CorrectionPlan, spec_dir: &Path) -> Result<bool> {
    let file_path = spec_dir.join(plan.target.file_name());
    let written = fs::read_to_string(&file_path)?;
    Ok(normalize(&written) == normalize(&plan.replacement))
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ErrorKind;
    use crate::spec::SpecArtifact;

    const GOOD_TASKS: &str = "# Tasks\n\n- [ ] 1. Rebuild the pipeline\n";

    fn options(temp: &tempfile::TempDir) -> ApplyOptions {
        ApplyOptions {
            spec_dir: temp.path().join("spec"),
            backup_dir: temp.path().join("backups"),
            max_backups: 5,
            max_attempts: 3,
            strict_validation: true,
        }
    }

    fn plan(replacement: &str) -> CorrectionPlan {
        CorrectionPlan {
            target: SpecArtifact::Tasks,
            replacement: replacement.to_string(),
            description: "rewrite tasks".to_string(),
            error_kind: ErrorKind::RuntimeError,
            attempt: 1,
        }
    }

    #[test]
    fn valid_plan_is_applied_and_verifiable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let options = options(&temp);
        let plan = plan(GOOD_TASKS);

        let report = apply_correction(&plan, &options);
        assert!(report.success, "unexpected rejection: {:?}", report.error);
        assert!(verify_applied(&plan, &options.spec_dir).expect("verify"));
    }

    /// Rejected content leaves the target byte-identical.
    #[test]
    fn rejected_content_leaves_target_untouched() {
        let temp = tempfile::tempdir().expect("tempdir");
        let options = options(&temp);
        fs::create_dir_all(&options.spec_dir).expect("create spec dir");
        let target = options.spec_dir.join("tasks.md");
        fs::write(&target, GOOD_TASKS).expect("seed");

        let bad = plan("# Tasks\n\nno checkboxes here\n");
        let report = apply_correction(&bad, &options);
        assert!(!report.success);
        assert!(report.error.expect("error").contains("checkbox"));
        assert_eq!(fs::read_to_string(&target).expect("read"), GOOD_TASKS);
        assert!(!options.backup_dir.exists());
    }

    #[test]
    fn empty_replacement_and_description_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut bad = plan("  ");
        bad.description = String::new();
        let report = apply_correction(&bad, &options(&temp));
        assert!(!report.success);
        let error = report.error.expect("error");
        assert!(error.contains("replacement text"));
        assert!(error.contains("description"));
    }

    #[test]
    fn attempt_outside_bounds_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut bad = plan(GOOD_TASKS);
        bad.attempt = 4;
        let report = apply_correction(&bad, &options(&temp));
        assert!(!report.success);
        assert!(report.error.expect("error").contains("attempt 4 outside [1, 3]"));
    }

    #[test]
    fn reapplication_backs_up_previous_version() {
        let temp = tempfile::tempdir().expect("tempdir");
        let options = options(&temp);

        let first = plan(GOOD_TASKS);
        assert!(apply_correction(&first, &options).success);

        let second = plan("# Tasks\n\n- [ ] 1. Rebuild differently\n");
        let report = apply_correction(&second, &options);
        assert!(report.success);
        let backup_path = report.backup_path.expect("backup path");
        assert_eq!(
            fs::read_to_string(backup_path).expect("read backup"),
            GOOD_TASKS
        );
    }

    #[test]
    fn verify_normalizes_line_endings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let options = options(&temp);
        let crlf = plan("# Tasks\r\n\r\n- [ ] 1. Windows edit\r\n");
        assert!(apply_correction(&crlf, &options).success);
        assert!(verify_applied(&crlf, &options.spec_dir).expect("verify"));
    }
}
