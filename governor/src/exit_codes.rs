//! Stable exit codes for governor CLI commands.

/// Command succeeded and the decision (if any) was `continue`.
pub const OK: i32 = 0;
/// Invalid input, contract, config, or other error.
pub const INVALID: i32 = 1;
/// The governing decision was `stop`.
pub const STOP: i32 = 2;
/// The governing decision was `escalate`.
pub const ESCALATE: i32 = 3;
