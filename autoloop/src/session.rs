//! The iteration state machine and the continuous loop.
//!
//! One iteration walks precheck → selecting → executing → verifying →
//! persisting → checkpointing → logging. The task list is read once at the
//! start and written at most once at the end; a crash mid-iteration leaves the
//! previous durable state intact.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::core::scheduler::{gated_task_ids, is_eligible, select_next};
use crate::core::security::SecurityPolicy;
use crate::io::checkpoint::{self, CheckpointOutcome, commit_message};
use crate::io::config::HarnessConfig;
use crate::io::events::{EventLogger, preview};
use crate::io::executor::{ExecRequest, Executor, ExecutorUnavailable};
use crate::io::init::ProjectPaths;
use crate::io::precheck::run_precheck;
use crate::io::progress;
use crate::io::prompt::{NARRATIVE_MAX_CHARS, PromptEngine, TaskPromptInputs};
use crate::io::run_log::{IterationRecord, append_record};
use crate::io::shell::GatedShell;
use crate::io::task_store::{load_tasks, save_tasks};
use crate::io::verify::run_verification;
use crate::tasks::{TaskList, TaskStatus};

/// Session id for a CLI command: `<command>-<yyyymmddhhmmss>`.
pub fn session_id(command: &str) -> String {
    format!("{command}-{}", Local::now().format("%Y%m%d%H%M%S"))
}

/// Everything an iteration needs, passed explicitly; there is no ambient
/// global project or session state.
pub struct SessionEnv<'a> {
    pub paths: &'a ProjectPaths,
    pub config: &'a HarnessConfig,
    pub policy: &'a SecurityPolicy,
    pub events: &'a EventLogger,
    pub engine: &'a PromptEngine,
}

/// Outcome of one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Nothing eligible. `all_complete` distinguishes "every task completed"
    /// from "remaining tasks unreachable (gated or blocked)".
    Done { all_complete: bool },
    /// The precheck failed; no task was selected or mutated.
    Blocked { summary: String },
    /// A task was worked on.
    Ran {
        task_id: String,
        status: TaskStatus,
        verified: String,
    },
}

/// How the loop should run.
#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    /// Iteration ceiling; `None` falls back to the configured maximum.
    pub max_iterations: Option<u32>,
    /// Run only this task id; it is reset to pending first and the loop stops
    /// once it is no longer selectable.
    pub pinned_task: Option<String>,
}

/// Why `run_loop` stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// Nothing eligible remains.
    Done { all_complete: bool },
    /// Precheck failure blocked the session.
    Blocked { summary: String },
    /// The configured iteration ceiling was reached.
    LimitReached { max_iterations: u32 },
    /// The pinned task is no longer selectable: terminal, blocked, or still
    /// gated by unmet dependencies.
    PinnedDone { task_id: String, status: TaskStatus },
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub iterations_run: u32,
    pub stop: LoopStop,
}

/// Run one iteration of the state machine.
///
/// Fatal errors (schema violations, I/O failures outside the run log) are
/// propagated; everything else resolves into an [`IterationOutcome`] and task
/// state.
#[instrument(skip_all, fields(iteration))]
pub fn run_iteration<E: Executor>(
    env: &SessionEnv<'_>,
    executor: &E,
    iteration: u32,
    pinned_task: Option<&str>,
) -> Result<IterationOutcome> {
    env.events.set_iteration(iteration);
    let mut record = IterationRecord::new(env.events.session_id(), iteration);
    let mut shell = GatedShell::new(
        env.policy,
        env.events,
        &env.paths.root,
        env.config.output_limit_bytes,
    );

    // Precheck
    env.events.phase("precheck");
    let precheck = run_precheck(
        &mut shell,
        &env.paths.root,
        Duration::from_secs(env.config.precheck_timeout_secs),
        env.config.preview_chars,
    )?;
    env.events.emit(
        "precheck",
        "session",
        "init.sh",
        json!({ "ran": precheck.ran, "summary": precheck.summary }),
        precheck.ok,
    );
    record.precheck = precheck.summary.clone();
    if !precheck.ok {
        warn!(summary = %precheck.summary, "precheck failed, session blocked");
        record.status = "blocked".to_string();
        finish_record(env, record);
        return Ok(IterationOutcome::Blocked {
            summary: precheck.summary,
        });
    }

    // Selecting
    env.events.phase("selecting");
    let mut list = load_tasks(&env.paths.tasks)?;
    // A pinned task obeys the same eligibility rule as scheduled selection;
    // a pin never overrides the dependency gate.
    let selected_id = match pinned_task {
        Some(id) => list
            .find(id)
            .filter(|t| is_eligible(&list, t))
            .map(|t| t.id.clone()),
        None => select_next(&list).map(|t| t.id.clone()),
    };
    let Some(task_id) = selected_id else {
        let gated = gated_task_ids(&list);
        let stats = list.stats();
        let all_complete = stats.completed == stats.total;
        env.events.emit(
            "session_end",
            "session",
            "no-actionable-task",
            json!({ "all_complete": all_complete, "gated": gated }),
            true,
        );
        record.status = "done".to_string();
        finish_record(env, record);
        return Ok(IterationOutcome::Done { all_complete });
    };
    record.task_id = task_id.clone();
    info!(task = %task_id, "task selected");

    // Executing
    env.events.phase("executing");
    if list.find(&task_id).map(|t| t.status) == Some(TaskStatus::Pending) {
        list.set_status(&task_id, TaskStatus::InProgress);
    }
    let prompt = render_task_prompt(env, &list, &task_id, &precheck.summary)?;
    let request = ExecRequest {
        workdir: env.paths.root.clone(),
        prompt,
        timeout: Duration::from_secs(env.config.assistant.timeout_secs),
        command_timeout: Duration::from_secs(env.config.command_timeout_secs),
        output_limit_bytes: env.config.output_limit_bytes,
    };
    let reply = match executor.execute(&request, &mut shell) {
        Ok(reply) => reply,
        Err(err) if err.downcast_ref::<ExecutorUnavailable>().is_some() => {
            warn!(err = %err, "executor unavailable, blocking task");
            env.events.emit(
                "error",
                "executor",
                "unavailable",
                json!({ "details": format!("{err:#}") }),
                false,
            );
            list.set_status(&task_id, TaskStatus::Blocked);
            list.touch();
            save_tasks(&env.paths.tasks, &list)?;
            record.status = TaskStatus::Blocked.as_str().to_string();
            record.verified = "skipped".to_string();
            finish_record(env, record);
            return Ok(IterationOutcome::Ran {
                task_id,
                status: TaskStatus::Blocked,
                verified: "skipped".to_string(),
            });
        }
        Err(err) => return Err(err),
    };
    env.events.emit(
        "assistant_text",
        "assistant",
        "reply",
        json!({ "text": reply.text, "commands_run": reply.commands.len() }),
        true,
    );
    record.output_preview = preview(reply.text.trim(), env.config.preview_chars);

    // Verifying
    env.events.phase("verifying");
    let verify_commands = list
        .find(&task_id)
        .map(|t| t.verify_commands.clone())
        .unwrap_or_default();
    let verification = run_verification(
        &mut shell,
        &verify_commands,
        Duration::from_secs(env.config.verify_timeout_secs),
    )?;
    env.events.emit(
        "verification",
        "session",
        "verify_commands",
        json!({
            "summary": verification.summary(),
            "commands": verify_commands,
            "first_failure_index": verification.first_failure_index,
        }),
        verification.ok,
    );
    record.verified = verification.summary();

    // Persisting
    env.events.phase("persisting");
    let status = if verification.ok {
        TaskStatus::Completed
    } else {
        TaskStatus::InProgress
    };
    if let Some(task) = list.find_mut(&task_id) {
        task.status = status;
        task.notes = format!("iteration {iteration}: verified {}", verification.summary());
        task.touch();
    }
    list.touch();
    save_tasks(&env.paths.tasks, &list)?;

    let task_name = list.find(&task_id).map(|t| t.name.clone()).unwrap_or_default();
    progress::append_section(
        &env.paths.root,
        &format!("Iteration {iteration}: {task_name}"),
        &format!(
            "Status: {}\nVerification: {}\n\n{}",
            status.as_str(),
            verification.summary(),
            record.output_preview
        ),
    )?;

    // Checkpointing
    env.events.phase("checkpointing");
    let outcome = checkpoint::checkpoint(&env.paths.root, &commit_message(&task_name, status));
    emit_checkpoint(env, &outcome);
    record.checkpoint = outcome.describe();

    // Logging
    record.status = status.as_str().to_string();
    finish_record(env, record);
    Ok(IterationOutcome::Ran {
        task_id,
        status,
        verified: verification.summary(),
    })
}

fn emit_checkpoint(env: &SessionEnv<'_>, outcome: &CheckpointOutcome) {
    env.events.emit(
        "checkpoint",
        "git",
        "commit",
        json!({ "committed": outcome.committed(), "reason": outcome.describe() }),
        outcome.ok(),
    );
}

fn finish_record(env: &SessionEnv<'_>, record: IterationRecord) {
    env.events.phase("logging");
    if let Err(e) = append_record(&env.paths.root, &record) {
        warn!(err = %e, "failed to append run record");
    }
}

fn render_task_prompt(
    env: &SessionEnv<'_>,
    list: &TaskList,
    task_id: &str,
    precheck_summary: &str,
) -> Result<String> {
    let task = list
        .find(task_id)
        .with_context(|| format!("selected task '{task_id}' disappeared"))?;
    let pending: Vec<String> = list
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending && t.id != task_id)
        .map(|t| format!("{}: {}", t.id, t.name))
        .collect();
    env.engine.render_task(&TaskPromptInputs {
        project_name: &list.project_name,
        tech_stack: &list.tech_stack,
        stats: list.stats(),
        narrative: progress::load_narrative(&env.paths.root, NARRATIVE_MAX_CHARS),
        history: checkpoint::recent_history(&env.paths.root, 5),
        precheck_summary: precheck_summary.to_string(),
        task,
        pending,
    })
}

/// Run iterations until done, blocked, the ceiling, or the pinned task
/// reaches a terminal state.
pub fn run_loop<E: Executor>(
    env: &SessionEnv<'_>,
    executor: &E,
    options: &LoopOptions,
) -> Result<LoopOutcome> {
    let max_iterations = options
        .max_iterations
        .unwrap_or(env.config.max_iterations)
        .max(1);

    if let Some(id) = options.pinned_task.as_deref() {
        reset_pinned_task(env, id)?;
    }

    env.events.emit(
        "session_start",
        "session",
        "run",
        json!({ "max_iterations": max_iterations, "pinned": options.pinned_task }),
        true,
    );

    let mut iterations_run = 0u32;
    loop {
        if iterations_run >= max_iterations {
            env.events.emit(
                "session_end",
                "session",
                "limit-reached",
                json!({ "max_iterations": max_iterations }),
                true,
            );
            return Ok(LoopOutcome {
                iterations_run,
                stop: LoopStop::LimitReached { max_iterations },
            });
        }
        let iteration = iterations_run + 1;
        match run_iteration(env, executor, iteration, options.pinned_task.as_deref())? {
            IterationOutcome::Done { all_complete } => {
                return Ok(LoopOutcome {
                    iterations_run,
                    stop: match options.pinned_task.clone() {
                        // The pin filtered selection down to nothing.
                        Some(task_id) => LoopStop::PinnedDone {
                            status: terminal_pinned_status(env, &task_id)?,
                            task_id,
                        },
                        None => LoopStop::Done { all_complete },
                    },
                });
            }
            IterationOutcome::Blocked { summary } => {
                env.events.emit(
                    "session_end",
                    "session",
                    "blocked",
                    json!({ "summary": summary }),
                    false,
                );
                return Ok(LoopOutcome {
                    iterations_run,
                    stop: LoopStop::Blocked { summary },
                });
            }
            IterationOutcome::Ran {
                task_id, status, ..
            } => {
                iterations_run += 1;
                if options.pinned_task.as_deref() == Some(task_id.as_str())
                    && matches!(status, TaskStatus::Completed | TaskStatus::Blocked)
                {
                    env.events.emit(
                        "session_end",
                        "session",
                        "pinned-task-done",
                        json!({ "task_id": task_id, "status": status.as_str() }),
                        true,
                    );
                    return Ok(LoopOutcome {
                        iterations_run,
                        stop: LoopStop::PinnedDone { task_id, status },
                    });
                }
            }
        }
    }
}

/// Re-running a named task starts it over from pending.
fn reset_pinned_task(env: &SessionEnv<'_>, task_id: &str) -> Result<()> {
    let mut list = load_tasks(&env.paths.tasks)?;
    if list.find(task_id).is_none() {
        anyhow::bail!("unknown task id '{task_id}'");
    }
    list.set_status(task_id, TaskStatus::Pending);
    list.touch();
    save_tasks(&env.paths.tasks, &list)
}

fn terminal_pinned_status(env: &SessionEnv<'_>, task_id: &str) -> Result<TaskStatus> {
    let list = load_tasks(&env.paths.tasks)?;
    Ok(list
        .find(task_id)
        .map(|t| t.status)
        .unwrap_or(TaskStatus::Blocked))
}
