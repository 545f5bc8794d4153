//! Shared deterministic types for the correction loop.
//!
//! These types define stable contracts between core components. They carry no
//! I/O handles and must remain deterministic across runs.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::spec::SpecArtifact;
use crate::tasks::TaskStatus;

/// Failure context produced by the external executor. Immutable once built.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorContext {
    pub task_id: String,
    pub message: String,
    #[serde(default)]
    pub trace: String,
    #[serde(default)]
    pub failed_test: Option<String>,
    #[serde(default)]
    pub timestamp_ms: u64,
}

/// Closed classification of failure kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TestFailure,
    CompilationError,
    RuntimeError,
    MissingDependency,
    InvalidSpec,
    TimeoutError,
    UnknownError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::TestFailure => "test_failure",
            ErrorKind::CompilationError => "compilation_error",
            ErrorKind::RuntimeError => "runtime_error",
            ErrorKind::MissingDependency => "missing_dependency",
            ErrorKind::InvalidSpec => "invalid_spec",
            ErrorKind::TimeoutError => "timeout_error",
            ErrorKind::UnknownError => "unknown_error",
        }
    }
}

/// Classification result for one failure. Derived per failure, never persisted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorAnalysis {
    pub kind: ErrorKind,
    /// One-sentence root cause, truncated to 200 characters.
    pub root_cause: String,
    /// Artifact the correction should rewrite.
    pub target: SpecArtifact,
    /// Advisory confidence 0-100. No core path gates on it.
    pub confidence: u8,
    #[serde(default)]
    pub requirement_ref: Option<String>,
    #[serde(default)]
    pub property_ref: Option<String>,
    #[serde(default)]
    pub source_location: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Whole-document replacement for one spec artifact.
///
/// Produced by the external correction generator; consumed by the applier.
/// Replacements are always full documents, never line-level patches.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrectionPlan {
    pub target: SpecArtifact,
    pub replacement: String,
    pub description: String,
    pub error_kind: ErrorKind,
    pub attempt: u32,
}

/// Committed status transition, delivered to registered listeners.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TaskEvent {
    pub task_id: String,
    pub previous_status: TaskStatus,
    pub new_status: TaskStatus,
    pub timestamp_ms: u64,
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
