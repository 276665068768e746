//! Executor abstraction for assistant invocation.
//!
//! The [`Executor`] trait decouples session orchestration from the actual
//! assistant backend. The production backend spawns the configured assistant
//! command, feeds it the rendered prompt on stdin, and reads the reply from
//! stdout. Shell commands the assistant asks for (fenced bash code blocks in
//! the reply) are executed through the gated [`CommandHost`] the session
//! provides;
//! the executor itself never bypasses the security gate. Tests use scripted
//! executors that return predetermined replies without spawning processes.

use std::fmt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::io::config::AssistantConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::shell::{CommandHost, CommandRequest, CommandResult};

/// Parameters for one executor invocation.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Working directory for the assistant process.
    pub workdir: PathBuf,
    /// Rendered prompt text.
    pub prompt: String,
    /// Maximum time to wait for the assistant to complete.
    pub timeout: Duration,
    /// Timeout for each assistant-requested shell command.
    pub command_timeout: Duration,
    /// Truncate assistant output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// What came back from one executor invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutorReply {
    /// The assistant's reply text.
    pub text: String,
    /// Results of the shell commands the assistant requested, in order.
    pub commands: Vec<CommandResult>,
}

/// The delegated executor could not be reached (spawn failure, timeout,
/// abnormal exit). Callers degrade gracefully: during init the analysis pass
/// is skipped, during a run the selected task is marked blocked.
#[derive(Debug)]
pub struct ExecutorUnavailable {
    pub details: String,
}

impl fmt::Display for ExecutorUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "executor unavailable: {}", self.details)
    }
}

impl std::error::Error for ExecutorUnavailable {}

fn unavailable(details: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(ExecutorUnavailable {
        details: details.into(),
    })
}

/// Abstraction over assistant backends.
pub trait Executor {
    /// Run the assistant once for the given request, routing any requested
    /// shell commands through `shell`.
    fn execute(&self, request: &ExecRequest, shell: &mut dyn CommandHost)
    -> Result<ExecutorReply>;
}

/// Executor that spawns the configured assistant command.
pub struct AssistantExecutor {
    config: AssistantConfig,
}

impl AssistantExecutor {
    pub fn new(config: AssistantConfig) -> Self {
        Self { config }
    }

    fn build_command(&self, request: &ExecRequest) -> Command {
        let mut cmd = Command::new(&self.config.command[0]);
        cmd.args(&self.config.command[1..]);
        if !self.config.model.is_empty() {
            cmd.arg("--model").arg(&self.config.model);
        }
        if !self.config.base_url.is_empty() {
            cmd.arg("--base-url").arg(&self.config.base_url);
        }
        cmd.current_dir(&request.workdir);
        cmd
    }
}

impl Executor for AssistantExecutor {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn execute(
        &self,
        request: &ExecRequest,
        shell: &mut dyn CommandHost,
    ) -> Result<ExecutorReply> {
        info!(workdir = %request.workdir.display(), "invoking assistant");

        let output = run_command_with_timeout(
            self.build_command(request),
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .map_err(|e| unavailable(format!("{e:#}")))?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "assistant timed out");
            return Err(unavailable(format!(
                "timed out after {:?}",
                request.timeout
            )));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "assistant exited abnormally");
            return Err(unavailable(format!(
                "exit status {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            )));
        }

        let text = output.stdout_lossy();
        let mut commands = Vec::new();
        for command in extract_shell_commands(&text) {
            let result = shell
                .run(&CommandRequest {
                    command,
                    timeout: request.command_timeout,
                })
                .context("run assistant-requested command")?;
            commands.push(result);
        }

        debug!(commands = commands.len(), "assistant reply processed");
        Ok(ExecutorReply { text, commands })
    }
}

/// Pull shell commands out of fenced bash/sh code blocks in a reply.
/// Non-empty, non-comment lines become individual commands.
pub fn extract_shell_commands(reply: &str) -> Vec<String> {
    let mut commands = Vec::new();
    let mut in_block = false;
    for line in reply.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("```") {
            if in_block {
                in_block = false;
            } else {
                let lang = rest.trim();
                in_block = lang == "bash" || lang == "sh" || lang == "shell";
            }
            continue;
        }
        if in_block && !trimmed.is_empty() && !trimmed.starts_with('#') {
            commands.push(trimmed.to_string());
        }
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_commands_from_bash_fences_only() {
        let reply = "Plan:\n```bash\necho one\n# comment\necho two\n```\n\
                     ```python\nprint('skip')\n```\n```sh\nls\n```\n";
        assert_eq!(
            extract_shell_commands(reply),
            vec!["echo one", "echo two", "ls"]
        );
    }

    #[test]
    fn reply_without_fences_has_no_commands() {
        assert!(extract_shell_commands("all prose, no code").is_empty());
    }

    #[test]
    fn unterminated_fence_still_collects_lines() {
        assert_eq!(
            extract_shell_commands("```bash\necho tail"),
            vec!["echo tail"]
        );
    }
}
