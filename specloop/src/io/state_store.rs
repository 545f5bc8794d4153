//! Orchestrator state storage and crash recovery.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::types::now_ms;
use crate::io::file_store::{WriteOptions, WriteOutcome, atomic_write};

pub const STATE_VERSION: u32 = 1;

/// Durable orchestrator state, owned by the task manager and persisted
/// synchronously after every mutation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrchestratorState {
    pub version: u32,
    /// Feature name of the loaded spec; a mismatch on reload means the spec
    /// changed underneath the state and the run starts fresh.
    pub spec_id: String,
    /// The single in-flight task, if any.
    pub current_task: Option<String>,
    pub started_at_ms: u64,
    /// Per-task correction attempt counters.
    #[serde(default)]
    pub attempts: BTreeMap<String, u32>,
    #[serde(default)]
    pub completed: BTreeSet<String>,
    #[serde(default)]
    pub skipped_optional: BTreeSet<String>,
}

impl OrchestratorState {
    pub fn new(spec_id: &str) -> Self {
        Self {
            version: STATE_VERSION,
            spec_id: spec_id.to_string(),
            current_task: None,
            started_at_ms: now_ms(),
            attempts: BTreeMap::new(),
            completed: BTreeSet::new(),
            skipped_optional: BTreeSet::new(),
        }
    }

    /// Structural checks against the task ids of the loaded spec.
    pub fn validate(&self, known_ids: &BTreeSet<String>) -> Vec<String> {
        let mut errors = Vec::new();
        if self.version != STATE_VERSION {
            errors.push(format!(
                "unsupported state version {} (expected {})",
                self.version, STATE_VERSION
            ));
        }
        if let Some(current) = &self.current_task
            && !known_ids.contains(current)
        {
            errors.push(format!("in-flight task '{current}' not in spec"));
        }
        for id in &self.completed {
            if !known_ids.contains(id) {
                errors.push(format!("completed task '{id}' not in spec"));
            }
        }
        for id in self.attempts.keys() {
            if !known_ids.contains(id) {
                errors.push(format!("attempt counter for unknown task '{id}'"));
            }
        }
        errors
    }
}

/// Load state from disk, failing on any parse error.
pub fn load_state(path: &Path) -> Result<OrchestratorState> {
    debug!(path = %path.display(), "loading orchestrator state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let state: OrchestratorState = serde_json::from_str(&contents)
        .with_context(|| format!("parse state {}", path.display()))?;
    Ok(state)
}

/// Atomically persist state to disk.
pub fn write_state(path: &Path, state: &OrchestratorState) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    match atomic_write(path, &buf, &WriteOptions::default())? {
        WriteOutcome::Written { .. } => Ok(()),
        WriteOutcome::Rejected { reason } => {
            Err(anyhow!("state write rejected unexpectedly: {reason}"))
        }
    }
}

/// Load state for startup, starting fresh (never crashing) when the file is
/// missing, unparseable, structurally invalid, or belongs to another spec.
pub fn load_or_recover(
    path: &Path,
    spec_id: &str,
    known_ids: &BTreeSet<String>,
) -> Result<OrchestratorState> {
    if !path.exists() {
        return Ok(OrchestratorState::new(spec_id));
    }
    let state = match load_state(path) {
        Ok(state) => state,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "state unreadable, starting fresh");
            return Ok(OrchestratorState::new(spec_id));
        }
    };
    if state.spec_id != spec_id {
        warn!(
            stored = %state.spec_id,
            loaded = %spec_id,
            "state belongs to a different spec, starting fresh"
        );
        return Ok(OrchestratorState::new(spec_id));
    }
    let errors = state.validate(known_ids);
    if !errors.is_empty() {
        warn!(errors = %errors.join("; "), "state rejected, starting fresh");
        return Ok(OrchestratorState::new(spec_id));
    }
    debug!(
        current_task = ?state.current_task,
        completed = state.completed.len(),
        "orchestrator state recovered"
    );
    Ok(state)
}
