//! Stable exit codes for CLI commands.

/// Command succeeded or a task was selected.
pub const OK: i32 = 0;
/// Command failed: invalid layout, config, spec, or another error.
pub const INVALID: i32 = 1;
/// `specloop select` found nothing eligible (run complete).
pub const COMPLETE: i32 = 2;
/// `specloop run`/`step` escalated an exhausted task to a human.
pub const ESCALATED: i32 = 3;
