//! Shared helpers for tests (unit and integration).
//!
//! Only compiled for tests or with the `test-support` feature.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;

use crate::core::security::SecurityPolicy;
use crate::io::config::HarnessConfig;
use crate::io::events::EventLogger;
use crate::io::executor::{ExecRequest, Executor, ExecutorReply, ExecutorUnavailable};
use crate::io::init::ProjectPaths;
use crate::io::prompt::PromptEngine;
use crate::io::shell::{CommandHost, CommandRequest, CommandResult, DENIED_EXIT_CODE};
use crate::io::task_store::{load_tasks, save_tasks};
use crate::session::SessionEnv;
use crate::tasks::{TaskList, TaskStatus};

/// Command host double that records commands and replies with scripted exit
/// codes (zero once the script runs out).
pub struct RecordingShell {
    pub commands: Vec<String>,
    exit_codes: VecDeque<i32>,
}

impl RecordingShell {
    pub fn passing() -> Self {
        Self {
            commands: Vec::new(),
            exit_codes: VecDeque::new(),
        }
    }

    pub fn with_exit_codes(codes: Vec<i32>) -> Self {
        Self {
            commands: Vec::new(),
            exit_codes: codes.into(),
        }
    }
}

impl CommandHost for RecordingShell {
    fn run(&mut self, request: &CommandRequest) -> Result<CommandResult> {
        self.commands.push(request.command.clone());
        let exit_code = self.exit_codes.pop_front().unwrap_or(0);
        Ok(CommandResult {
            command: request.command.clone(),
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: false,
            denied: exit_code == DENIED_EXIT_CODE,
        })
    }
}

/// One scripted executor turn.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Reply(ExecutorReply),
    Unavailable,
}

impl ScriptedReply {
    pub fn text(text: &str) -> Self {
        Self::Reply(ExecutorReply {
            text: text.to_string(),
            commands: Vec::new(),
        })
    }
}

/// Executor double that plays back scripted replies without spawning anything.
pub struct ScriptedExecutor {
    script: RefCell<VecDeque<ScriptedReply>>,
    repeating: Option<ScriptedReply>,
    calls: Cell<usize>,
}

impl ScriptedExecutor {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            script: RefCell::new(replies.into()),
            repeating: None,
            calls: Cell::new(0),
        }
    }

    /// Returns the same reply on every call.
    pub fn repeating(reply: ScriptedReply) -> Self {
        Self {
            script: RefCell::new(VecDeque::new()),
            repeating: Some(reply),
            calls: Cell::new(0),
        }
    }

    /// Fails every call with [`ExecutorUnavailable`].
    pub fn unavailable() -> Self {
        Self::repeating(ScriptedReply::Unavailable)
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Executor for ScriptedExecutor {
    fn execute(
        &self,
        _request: &ExecRequest,
        _shell: &mut dyn CommandHost,
    ) -> Result<ExecutorReply> {
        self.calls.set(self.calls.get() + 1);
        let turn = self
            .script
            .borrow_mut()
            .pop_front()
            .or_else(|| self.repeating.clone())
            .expect("scripted executor ran out of replies");
        match turn {
            ScriptedReply::Reply(reply) => Ok(reply),
            ScriptedReply::Unavailable => Err(anyhow::Error::new(ExecutorUnavailable {
                details: "scripted outage".to_string(),
            })),
        }
    }
}

/// Temp directory with an initialized git repo (identity configured locally so
/// commits work on hosts without global git config).
pub struct TestRepo {
    temp: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        git(root, &["init"]);
        git(root, &["config", "user.name", "tester"]);
        git(root, &["config", "user.email", "tester@example.com"]);
        std::fs::write(root.join(".keep"), "").expect("write .keep");
        git(root, &["add", "-A"]);
        git(root, &["commit", "-m", "chore: seed repo"]);
        Self { temp }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn write_file(&self, name: &str, contents: &str) {
        std::fs::write(self.temp.path().join(name), contents).expect("write file");
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .status()
        .expect("spawn git");
    assert!(status.success(), "git {args:?} failed");
}

/// Fully wired project directory for session tests: task list on disk plus
/// the config/policy/events/engine an iteration needs.
pub struct TestProject {
    paths: ProjectPaths,
    config: HarnessConfig,
    policy: SecurityPolicy,
    events: EventLogger,
    engine: PromptEngine,
    _temp: tempfile::TempDir,
}

impl TestProject {
    pub fn with_tasks(list: TaskList) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        save_tasks(&paths.tasks, &list).expect("save tasks");
        let config = HarnessConfig {
            command_timeout_secs: 10,
            precheck_timeout_secs: 10,
            verify_timeout_secs: 10,
            ..HarnessConfig::default()
        };
        let events = EventLogger::new(temp.path(), "test-session", false, config.preview_chars);
        Self {
            paths,
            config,
            policy: SecurityPolicy::new().expect("policy"),
            events,
            engine: PromptEngine::new().expect("engine"),
            _temp: temp,
        }
    }

    pub fn env(&self) -> SessionEnv<'_> {
        SessionEnv {
            paths: &self.paths,
            config: &self.config,
            policy: &self.policy,
            events: &self.events,
            engine: &self.engine,
        }
    }

    pub fn path(&self) -> &Path {
        &self.paths.root
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    pub fn write_file(&self, name: &str, contents: &str) {
        std::fs::write(self.paths.root.join(name), contents).expect("write file");
    }

    pub fn task_status(&self, id: &str) -> TaskStatus {
        let list = load_tasks(&self.paths.tasks).expect("load tasks");
        list.find(id).map(|t| t.status).expect("task exists")
    }

    pub fn events_path(&self) -> PathBuf {
        self.paths.events.clone()
    }
}
