//! Loop configuration stored under `.specloop/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::file_store::{WriteOptions, WriteOutcome, atomic_write};

/// Loop configuration (TOML).
///
/// This file is edited by humans and must remain stable and automatable.
/// Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    /// Correction attempts per task before escalation.
    pub max_attempts: u32,

    /// Backups kept per artifact file before pruning.
    pub max_backups: usize,

    /// Enforce the per-artifact content schema when applying corrections.
    pub strict_validation: bool,

    /// Include optional tasks in selection.
    pub include_optional: bool,

    /// Directory holding `spec.json` and the three artifact files,
    /// relative to the project root.
    pub spec_dir: String,

    pub executor: ExecutorConfig,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Command to execute a task; the task id is appended as the final arg.
    pub command: Vec<String>,
    /// Wall-clock budget per task execution in seconds.
    pub timeout_secs: u64,
    /// Truncate captured executor output beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that turns a correction brief (stdin) into a plan file.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command: vec!["just".to_string(), "run-task".to_string()],
            timeout_secs: 30 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["specloop-generate".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_backups: 10,
            strict_validation: true,
            include_optional: false,
            spec_dir: "spec".to_string(),
            executor: ExecutorConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.max_backups == 0 {
            return Err(anyhow!("max_backups must be > 0"));
        }
        if self.spec_dir.trim().is_empty() {
            return Err(anyhow!("spec_dir must not be empty"));
        }
        validate_command("executor.command", &self.executor.command)?;
        validate_command("generator.command", &self.generator.command)?;
        if self.executor.timeout_secs == 0 || self.generator.timeout_secs == 0 {
            return Err(anyhow!("timeouts must be > 0"));
        }
        if self.executor.output_limit_bytes == 0 || self.generator.output_limit_bytes == 0 {
            return Err(anyhow!("output limits must be > 0"));
        }
        Ok(())
    }
}

fn validate_command(label: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{label} must be a non-empty array"));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoopConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        let cfg = LoopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LoopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk.
pub fn write_config(path: &Path, cfg: &LoopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    match atomic_write(path, &buf, &WriteOptions::default())? {
        WriteOutcome::Written { .. } => Ok(()),
        WriteOutcome::Rejected { reason } => {
            Err(anyhow!("config write rejected unexpectedly: {reason}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LoopConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = LoopConfig {
            max_attempts: 5,
            ..LoopConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn zero_max_attempts_is_rejected() {
        let cfg = LoopConfig {
            max_attempts: 0,
            ..LoopConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_generator_command_is_rejected() {
        let cfg = LoopConfig {
            generator: GeneratorConfig {
                command: Vec::new(),
                ..GeneratorConfig::default()
            },
            ..LoopConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
