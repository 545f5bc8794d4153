//! Spec-driven autonomous execution with bounded self-correction.
//!
//! Given a parsed specification (requirements, design properties, and an
//! ordered task tree), the loop executes tasks one at a time, classifies
//! failures, rewrites the offending spec artifact through a validated
//! atomic file store, and retries up to a fixed attempt cap before
//! escalating to a human. The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (selection, transitions,
//!   classification, validation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (file store, persistence,
//!   subprocess adapters). Isolated to enable scripting in tests.
//!
//! Orchestration modules ([`manager`], [`ralph`], [`orchestrator`])
//! coordinate core logic with I/O to implement the CLI commands.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod manager;
pub mod orchestrator;
pub mod ralph;
pub mod spec;
pub mod tasks;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
