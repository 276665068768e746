//! Side-effecting adapters: filesystem, git, subprocesses, the assistant
//! executor, and the project's durable logs.

pub mod checkpoint;
pub mod config;
pub mod events;
pub mod executor;
pub mod git;
pub mod init;
pub mod precheck;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod run_log;
pub mod shell;
pub mod task_store;
pub mod verify;
