//! Gated command host: the single chokepoint every shell command goes through.
//!
//! Whether a command comes from the engine (precheck, verification) or from
//! the delegated executor, it is authorized by the security policy first.
//! Each decision is recorded as a `security` event; executed commands add a
//! `tool_call`/`tool_result` pair. A denial becomes a failed result with the
//! denial reason on stderr; the command is never spawned and the session
//! continues.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde_json::json;

use crate::core::security::SecurityPolicy;
use crate::io::events::EventLogger;
use crate::io::process::{run_command_with_timeout, shell_command};

/// Exit code reported for commands the policy refused to run.
pub const DENIED_EXIT_CODE: i32 = 126;

#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub timeout: Duration,
}

/// Result of one gated command, denied or executed.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub denied: bool,
}

impl CommandResult {
    pub fn ok(&self) -> bool {
        self.exit_code == 0
    }
}

/// Seam between the engine/executor and command execution. Production uses
/// [`GatedShell`]; tests script results.
pub trait CommandHost {
    fn run(&mut self, request: &CommandRequest) -> Result<CommandResult>;
}

/// Policy-gated shell bound to one project directory and event stream.
pub struct GatedShell<'a> {
    policy: &'a SecurityPolicy,
    events: &'a EventLogger,
    project_dir: PathBuf,
    output_limit_bytes: usize,
}

impl<'a> GatedShell<'a> {
    pub fn new(
        policy: &'a SecurityPolicy,
        events: &'a EventLogger,
        project_dir: impl Into<PathBuf>,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            policy,
            events,
            project_dir: project_dir.into(),
            output_limit_bytes,
        }
    }
}

impl CommandHost for GatedShell<'_> {
    fn run(&mut self, request: &CommandRequest) -> Result<CommandResult> {
        let decision = self.policy.authorize(&request.command);
        // Every authorization decision is an event, allowed or not.
        self.events.emit(
            "security",
            "security",
            if decision.allowed { "allow" } else { "deny" },
            json!({
                "command": request.command,
                "reason": decision.reason,
                "risk": decision.risk,
            }),
            decision.allowed,
        );
        if !decision.allowed {
            return Ok(CommandResult {
                command: request.command.clone(),
                exit_code: DENIED_EXIT_CODE,
                stdout: String::new(),
                stderr: format!("command denied by security policy: {}", decision.reason),
                timed_out: false,
                denied: true,
            });
        }

        self.events.emit(
            "tool_call",
            "shell",
            "bash",
            json!({ "command": request.command }),
            true,
        );
        let output = run_command_with_timeout(
            shell_command(&request.command, &self.project_dir),
            None,
            request.timeout,
            self.output_limit_bytes,
        )?;
        let result = CommandResult {
            command: request.command.clone(),
            exit_code: output.exit_code(),
            stdout: output.stdout_lossy() + &output.truncated_notice("shell"),
            stderr: output.stderr_lossy(),
            timed_out: output.timed_out,
            denied: false,
        };
        self.events.emit(
            "tool_result",
            "shell",
            "bash",
            json!({
                "command": result.command,
                "exit_code": result.exit_code,
                "stdout": result.stdout,
                "stderr": result.stderr,
                "timed_out": result.timed_out,
            }),
            result.ok(),
        );
        Ok(result)
    }
}
