//! Stable exit codes for autoloop CLI commands.

/// Command succeeded, or the loop finished (all tasks complete or none eligible).
pub const OK: i32 = 0;
/// Command failed due to an invalid task list/config/layout or other errors.
pub const INVALID: i32 = 1;
/// `autoloop run` stopped because the session precheck failed.
pub const BLOCKED: i32 = 3;
