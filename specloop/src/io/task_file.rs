//! Rendering of the human-readable tasks artifact.
//!
//! The task file is rewritten on every committed transition so the
//! persisted artifact never diverges from in-memory state. Completed tasks
//! are checkbox-marked; everything else renders unchecked.

use std::path::Path;

use anyhow::{Result, anyhow};

use crate::io::file_store::{WriteOptions, WriteOutcome, atomic_write};
use crate::tasks::{Task, TaskStatus};

/// Render the checkbox-marked task document.
pub fn render_task_file(feature_name: &str, tasks: &[Task]) -> String {
    let mut buf = format!("# Tasks — {feature_name}\n\n");
    render_level(tasks, 0, &mut buf);
    buf
}

fn render_level(tasks: &[Task], depth: usize, buf: &mut String) {
    for task in tasks {
        let indent = "  ".repeat(depth);
        let mark = if task.status == TaskStatus::Completed {
            'x'
        } else {
            ' '
        };
        buf.push_str(&format!(
            "{}- [{}] {}. {}",
            indent, mark, task.id, task.description
        ));
        if task.optional {
            buf.push_str(" (optional)");
        }
        if !task.requirement_refs.is_empty() {
            buf.push_str(&format!(
                " _Requirements: {}_",
                task.requirement_refs.join(", ")
            ));
        }
        buf.push('\n');
        render_level(&task.children, depth + 1, buf);
    }
}

/// Atomically write the rendered task file.
pub fn write_task_file(path: &Path, feature_name: &str, tasks: &[Task]) -> Result<()> {
    let rendered = render_task_file(feature_name, tasks);
    match atomic_write(path, &rendered, &WriteOptions::default())? {
        WriteOutcome::Written { .. } => Ok(()),
        WriteOutcome::Rejected { reason } => {
            Err(anyhow!("task file write rejected unexpectedly: {reason}"))
        }
    }
}
