//! Durable file store: atomic write with optional validation and backups.
//!
//! Every write lands in a sibling temp file and commits via a single
//! `fs::rename`, so the target is either fully replaced or untouched. A
//! rejected validation is a value, not an error: the caller asked a
//! question and got an answer, with zero filesystem change. This primitive
//! does not serialize concurrent writers to the same path; callers own
//! their designated files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::core::types::now_ms;

/// Options for a single atomic write.
pub struct WriteOptions<'a> {
    /// Runs before any filesystem mutation; an `Err` aborts the write.
    pub validate: Option<&'a dyn Fn(&str) -> Result<(), String>>,
    /// Create missing parent directories.
    pub create_dirs: bool,
}

impl Default for WriteOptions<'_> {
    fn default() -> Self {
        Self {
            validate: None,
            create_dirs: true,
        }
    }
}

/// Backup policy for [`atomic_write_with_backup`].
#[derive(Clone, Debug)]
pub struct BackupConfig {
    pub backup_dir: PathBuf,
    /// Oldest backups beyond this count are pruned after each write.
    pub max_backups: usize,
}

/// Result of an atomic write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { backup_path: Option<PathBuf> },
    Rejected { reason: String },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

/// Atomically replace `path` with `content`.
pub fn atomic_write(path: &Path, content: &str, options: &WriteOptions<'_>) -> Result<WriteOutcome> {
    if let Some(reason) = run_validator(options, content) {
        return Ok(WriteOutcome::Rejected { reason });
    }
    prepare_parent(path, options)?;
    commit(path, content)?;
    Ok(WriteOutcome::Written { backup_path: None })
}

/// Atomically replace `path`, first copying the existing file into the
/// backup directory under a timestamped name, then pruning old backups.
pub fn atomic_write_with_backup(
    path: &Path,
    content: &str,
    options: &WriteOptions<'_>,
    backup: &BackupConfig,
) -> Result<WriteOutcome> {
    if let Some(reason) = run_validator(options, content) {
        return Ok(WriteOutcome::Rejected { reason });
    }
    prepare_parent(path, options)?;

    let backup_path = if path.exists() {
        Some(create_backup(path, &backup.backup_dir)?)
    } else {
        None
    };
    prune_backups(path, backup)?;
    commit(path, content)?;

    Ok(WriteOutcome::Written { backup_path })
}

fn run_validator(options: &WriteOptions<'_>, content: &str) -> Option<String> {
    let validate = options.validate?;
    validate(content).err()
}

fn prepare_parent(path: &Path, options: &WriteOptions<'_>) -> Result<()> {
    if !options.create_dirs {
        return Ok(());
    }
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))
}

fn commit(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("path has no file name: {}", path.display()))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));
    fs::write(&tmp_path, content)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        // The original is untouched; drop the orphaned temp file.
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("replace {}", path.display()));
    }
    debug!(path = %path.display(), "atomic write committed");
    Ok(())
}

fn create_backup(path: &Path, backup_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(backup_dir)
        .with_context(|| format!("create backup directory {}", backup_dir.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("path has no file name: {}", path.display()))?;

    // Same-millisecond collisions bump the stamp so lexicographic order
    // stays age order.
    let mut stamp = now_ms();
    let mut candidate = backup_dir.join(format!("{file_name}.{stamp}.bak"));
    while candidate.exists() {
        stamp += 1;
        candidate = backup_dir.join(format!("{file_name}.{stamp}.bak"));
    }

    fs::copy(path, &candidate)
        .with_context(|| format!("back up {} to {}", path.display(), candidate.display()))?;
    debug!(backup = %candidate.display(), "backup created");
    Ok(candidate)
}

fn prune_backups(path: &Path, backup: &BackupConfig) -> Result<()> {
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        return Ok(());
    };
    if !backup.backup_dir.is_dir() {
        return Ok(());
    }

    let prefix = format!("{file_name}.");
    let mut backups: Vec<PathBuf> = fs::read_dir(&backup.backup_dir)
        .with_context(|| format!("read backup directory {}", backup.backup_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|candidate| {
            candidate
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".bak"))
        })
        .collect();

    // Millisecond stamps are fixed-width, so lexicographic order is age order.
    backups.sort();
    while backups.len() > backup.max_backups {
        let oldest = backups.remove(0);
        warn!(backup = %oldest.display(), "pruning old backup");
        fs::remove_file(&oldest)
            .with_context(|| format!("remove old backup {}", oldest.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn atomic_write_replaces_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("state.json");

        let outcome =
            atomic_write(&path, "first", &WriteOptions::default()).expect("write");
        assert!(outcome.is_written());
        assert_eq!(fs::read_to_string(&path).expect("read"), "first");

        atomic_write(&path, "second", &WriteOptions::default()).expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "second");
    }

    /// A rejected validation leaves the filesystem untouched.
    #[test]
    fn validation_failure_mutates_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("doc.md");
        fs::write(&path, "original").expect("seed");

        let validate = |_: &str| -> Result<(), String> { Err("not structured".to_string()) };
        let options = WriteOptions {
            validate: Some(&validate),
            create_dirs: true,
        };
        let backup = BackupConfig {
            backup_dir: temp.path().join("backups"),
            max_backups: 3,
        };

        let outcome =
            atomic_write_with_backup(&path, "replacement", &options, &backup).expect("write");
        assert_eq!(
            outcome,
            WriteOutcome::Rejected {
                reason: "not structured".to_string()
            }
        );
        assert_eq!(fs::read_to_string(&path).expect("read"), "original");
        assert!(!backup.backup_dir.exists());
    }

    #[test]
    fn backup_is_taken_before_replacement() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("doc.md");
        fs::write(&path, "v1").expect("seed");

        let backup = BackupConfig {
            backup_dir: temp.path().join("backups"),
            max_backups: 10,
        };
        let outcome = atomic_write_with_backup(&path, "v2", &WriteOptions::default(), &backup)
            .expect("write");

        let WriteOutcome::Written { backup_path } = outcome else {
            panic!("expected written outcome");
        };
        let backup_path = backup_path.expect("backup path");
        assert_eq!(fs::read_to_string(&backup_path).expect("read backup"), "v1");
        assert_eq!(fs::read_to_string(&path).expect("read"), "v2");
    }

    #[test]
    fn first_write_has_no_backup() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("doc.md");
        let backup = BackupConfig {
            backup_dir: temp.path().join("backups"),
            max_backups: 10,
        };

        let outcome = atomic_write_with_backup(&path, "v1", &WriteOptions::default(), &backup)
            .expect("write");
        assert_eq!(outcome, WriteOutcome::Written { backup_path: None });
    }

    #[test]
    fn old_backups_are_pruned_to_max() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("doc.md");
        let backup = BackupConfig {
            backup_dir: temp.path().join("backups"),
            max_backups: 2,
        };

        for version in 0..5 {
            atomic_write_with_backup(
                &path,
                &format!("v{version}"),
                &WriteOptions::default(),
                &backup,
            )
            .expect("write");
        }

        let count = fs::read_dir(&backup.backup_dir)
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .count();
        assert_eq!(count, 2);
    }
}
