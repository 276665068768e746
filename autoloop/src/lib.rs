//! Long-running session harness for iterative, verifiable project work.
//!
//! The harness repeatedly picks the next actionable task, delegates its
//! execution to an external assistant process, gates the result behind the
//! task's verification commands, and checkpoints accepted progress into git.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (scheduling, command security).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, process execution,
//!   the assistant executor). Isolated to enable scripted doubles in tests.
//!
//! [`session`] coordinates core logic with I/O to implement the iteration
//! state machine behind the CLI commands; [`status`] reports on a project.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
pub mod status;
pub mod tasks;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
