//! Canonical paths and `.specloop/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::io::config::{LoopConfig, write_config};
use crate::io::spec_store::write_spec;
use crate::io::task_file::write_task_file;
use crate::spec::{ParsedSpec, Property, Requirement, SpecArtifact};
use crate::tasks::Task;

/// All runner-owned paths for a project root.
#[derive(Debug, Clone)]
pub struct SpecloopPaths {
    pub root: PathBuf,
    pub specloop_dir: PathBuf,
    pub config_path: PathBuf,
    pub state_path: PathBuf,
    pub backups_dir: PathBuf,
    pub corrections_dir: PathBuf,
    pub error_path: PathBuf,
}

impl SpecloopPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let specloop_dir = root.join(".specloop");
        Self {
            root: root.clone(),
            specloop_dir: specloop_dir.clone(),
            config_path: specloop_dir.join("config.toml"),
            state_path: specloop_dir.join("state.json"),
            backups_dir: specloop_dir.join("backups"),
            corrections_dir: specloop_dir.join("corrections"),
            error_path: specloop_dir.join("last_error.json"),
        }
    }
}

/// Paths inside the spec directory.
#[derive(Debug, Clone)]
pub struct SpecDirPaths {
    pub dir: PathBuf,
}

impl SpecDirPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `spec.json`, the external parser's structured output.
    pub fn parsed_spec_path(&self) -> PathBuf {
        self.dir.join("spec.json")
    }

    pub fn artifact_path(&self, artifact: SpecArtifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }
}

/// Options for `init_layout`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite existing runner-owned files.
    pub force: bool,
}

/// Create `.specloop/` scaffolding plus a sample spec directory.
///
/// Fails if `.specloop/` already exists unless `options.force` is set.
pub fn init_layout(root: &Path, spec_dir: &Path, options: &InitOptions) -> Result<SpecloopPaths> {
    let paths = SpecloopPaths::new(root);
    if paths.specloop_dir.exists() && !options.force {
        return Err(anyhow!(
            "init: .specloop already exists (use --force to overwrite)"
        ));
    }
    if paths.specloop_dir.exists() && !paths.specloop_dir.is_dir() {
        return Err(anyhow!("init: .specloop exists but is not a directory"));
    }

    create_dir(&paths.specloop_dir)?;
    create_dir(&paths.backups_dir)?;
    create_dir(&paths.corrections_dir)?;
    write_config(&paths.config_path, &LoopConfig::default())?;

    let spec_paths = SpecDirPaths::new(spec_dir);
    create_dir(&spec_paths.dir)?;
    let sample = sample_parsed_spec();
    write_if_missing_or_force(
        &spec_paths.parsed_spec_path(),
        options.force,
        |path| write_spec(path, &sample),
    )?;
    write_if_missing_or_force(
        &spec_paths.artifact_path(SpecArtifact::Requirements),
        options.force,
        |path| write_text(path, REQUIREMENTS_PLACEHOLDER),
    )?;
    write_if_missing_or_force(
        &spec_paths.artifact_path(SpecArtifact::Design),
        options.force,
        |path| write_text(path, DESIGN_PLACEHOLDER),
    )?;
    write_if_missing_or_force(
        &spec_paths.artifact_path(SpecArtifact::Tasks),
        options.force,
        |path| write_task_file(path, &sample.feature_name, &sample.tasks),
    )?;

    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

fn write_if_missing_or_force(
    path: &Path,
    force: bool,
    write: impl FnOnce(&Path) -> Result<()>,
) -> Result<()> {
    if !force && path.exists() {
        return Ok(());
    }
    write(path)
}

fn sample_parsed_spec() -> ParsedSpec {
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
        tasks: vec![
            Task {
                id: "1".to_string(),
                description: "Set up the feature scaffold".to_string(),
                status: Default::default(),
                optional: false,
                requirement_refs: vec!["R1".to_string()],
                property_refs: Vec::new(),
                children: Vec::new(),
            },
            Task {
                id: "2".to_string(),
                description: "Implement the core".to_string(),
                status: Default::default(),
                optional: false,
                requirement_refs: Vec::new(),
                property_refs: vec!["P1".to_string()],
                children: vec![Task {
                    id: "2.1".to_string(),
                    description: "Write the data model".to_string(),
                    status: Default::default(),
                    optional: false,
                    requirement_refs: Vec::new(),
                    property_refs: Vec::new(),
                    children: Vec::new(),
                }],
            },
            Task {
                id: "3".to_string(),
                description: "Polish diagnostics".to_string(),
                status: Default::default(),
                optional: true,
                requirement_refs: Vec::new(),
                property_refs: Vec::new(),
                children: Vec::new(),
            },
        ],
    }
}

const REQUIREMENTS_PLACEHOLDER: &str = "# Requirements — sample-feature\n\n\
## Requirement 1: Ordered execution\n\n\
The system executes tasks one at a time in document order.\n\n\
#### Acceptance Criteria\n\n\
- Tasks complete in document order without manual intervention.\n";

const DESIGN_PLACEHOLDER: &str = "# Design — sample-feature\n\n\
## Overview\n\n\
Describe how the feature satisfies each requirement.\n";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::spec_store::load_spec;

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let spec_dir = root.join("spec");

        let paths = init_layout(root, &spec_dir, &InitOptions { force: false }).expect("init");

        assert!(paths.specloop_dir.is_dir());
        assert!(paths.backups_dir.is_dir());
        assert!(paths.corrections_dir.is_dir());
        assert!(paths.config_path.is_file());

        let spec_paths = SpecDirPaths::new(&spec_dir);
        assert!(spec_paths.parsed_spec_path().is_file());
        for artifact in SpecArtifact::ALL {
            assert!(spec_paths.artifact_path(artifact).is_file());
        }

        // The sample spec loads cleanly through the validating store.
        let spec = load_spec(&spec_paths.parsed_spec_path()).expect("load sample");
        assert_eq!(spec.feature_name, "sample-feature");
    }

    #[test]
    fn init_without_force_refuses_existing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let spec_dir = root.join("spec");

        init_layout(root, &spec_dir, &InitOptions { force: false }).expect("init");
        let err = init_layout(root, &spec_dir, &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn placeholder_artifacts_pass_strict_validation() {
        use crate::core::artifact::validate_artifact;

        assert!(validate_artifact(SpecArtifact::Requirements, REQUIREMENTS_PLACEHOLDER, true)
            .is_empty());
        assert!(validate_artifact(SpecArtifact::Design, DESIGN_PLACEHOLDER, true).is_empty());
    }
}
