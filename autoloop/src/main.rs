//! Session harness CLI.
//!
//! Drives iterative, verifiable work on a project directory: scheduling tasks,
//! delegating execution to an external assistant, gating results behind verify
//! commands, and checkpointing accepted progress.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;

use autoloop::core::security::SecurityPolicy;
use autoloop::exit_codes;
use autoloop::io::config::{HarnessConfig, load_config};
use autoloop::io::events::EventLogger;
use autoloop::io::executor::{AssistantExecutor, ExecRequest, Executor, ExecutorUnavailable};
use autoloop::io::init::{InitOptions, ProjectPaths, init_project};
use autoloop::io::progress;
use autoloop::io::prompt::PromptEngine;
use autoloop::io::shell::GatedShell;
use autoloop::io::task_store::{SchemaError, load_tasks, save_tasks};
use autoloop::session::{LoopOptions, LoopStop, SessionEnv, run_loop, session_id};
use autoloop::status::print_status;
use autoloop::tasks::{Priority, Task, TaskStatus, now_stamp};

#[derive(Parser)]
#[command(
    name = "autoloop",
    version,
    about = "Iterative session harness: schedule, execute, verify, checkpoint"
)]
struct Cli {
    /// Model name forwarded to the assistant.
    #[arg(long, global = true)]
    model: Option<String>,

    /// OpenAI-compatible endpoint forwarded to the assistant.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Force event rendering on the console.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress console event rendering (events.jsonl is still written).
    #[arg(long, global = true)]
    quiet_events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scaffold a project directory with a seed task list.
    Init {
        dir: PathBuf,
        /// What the project should become; stored in the progress narrative.
        #[arg(long)]
        spec: String,
        /// Project name (defaults to the directory name).
        #[arg(long)]
        name: Option<String>,
        /// Overwrite an existing tasks.json.
        #[arg(long)]
        force: bool,
    },
    /// Run one iteration, or loop until done/blocked/ceiling.
    Run {
        dir: PathBuf,
        /// Iteration ceiling (implies continuous mode).
        #[arg(short, long)]
        iterations: Option<u32>,
        /// Loop until nothing is eligible or the configured ceiling.
        #[arg(long)]
        continuous: bool,
        /// Run exactly this task id (reset to pending first).
        #[arg(long)]
        task: Option<String>,
    },
    /// Report project status.
    Status {
        dir: PathBuf,
        /// Machine-readable output.
        #[arg(long)]
        json: bool,
    },
    /// Append a task to the task list.
    AddTask {
        dir: PathBuf,
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        desc: String,
        /// high, medium or low.
        #[arg(long, default_value = "medium", value_parser = parse_priority)]
        priority: Priority,
        /// Verification command; repeatable, run in order.
        #[arg(long = "verify")]
        verify: Vec<String>,
        /// Dependency task id; repeatable.
        #[arg(long = "depends")]
        depends: Vec<String>,
    },
    /// Interactive dialogue about the project (exit/quit to leave).
    Chat { dir: PathBuf },
}

fn parse_priority(raw: &str) -> Result<Priority, String> {
    match raw {
        "high" => Ok(Priority::High),
        "medium" => Ok(Priority::Medium),
        "low" => Ok(Priority::Low),
        other => Err(format!("unknown priority '{other}' (high|medium|low)")),
    }
}

fn main() {
    autoloop::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let render_events = cli.verbose || !cli.quiet_events;
    match &cli.command {
        Command::Init {
            dir,
            spec,
            name,
            force,
        } => cmd_init(&cli, dir, spec, name.as_deref(), *force, render_events),
        Command::Run {
            dir,
            iterations,
            continuous,
            task,
        } => cmd_run(&cli, dir, *iterations, *continuous, task.clone(), render_events),
        Command::Status { dir, json } => cmd_status(dir, *json, render_events),
        Command::AddTask {
            dir,
            id,
            name,
            desc,
            priority,
            verify,
            depends,
        } => cmd_add_task(dir, id, name, desc, *priority, verify, depends, render_events),
        Command::Chat { dir } => cmd_chat(&cli, dir, render_events),
    }
}

/// Merge CLI assistant overrides into the loaded config.
fn effective_config(cli: &Cli, paths: &ProjectPaths) -> Result<HarnessConfig> {
    let mut config = load_config(&paths.config)?;
    if let Some(model) = &cli.model {
        config.assistant.model = model.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.assistant.base_url = base_url.clone();
    }
    Ok(config)
}

fn cmd_init(
    cli: &Cli,
    dir: &PathBuf,
    spec: &str,
    name: Option<&str>,
    force: bool,
    render_events: bool,
) -> Result<i32> {
    let paths = ProjectPaths::new(dir);
    let project_name = name
        .map(str::to_string)
        .or_else(|| {
            dir.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "project".to_string());

    init_project(&paths, &project_name, spec, &InitOptions { force })?;
    println!("initialized {} at {}", project_name, paths.root.display());

    // Analysis pass is best-effort: without a reachable assistant the scaffold
    // alone is still a valid project.
    let config = effective_config(cli, &paths)?;
    let events = EventLogger::new(
        &paths.root,
        session_id("init"),
        render_events,
        config.preview_chars,
    );
    let policy = SecurityPolicy::new()?;
    let engine = PromptEngine::new()?;
    let executor = AssistantExecutor::new(config.assistant.clone());
    let prompt = engine.render_init(&project_name, spec)?;
    let mut shell = GatedShell::new(&policy, &events, &paths.root, config.output_limit_bytes);
    let request = ExecRequest {
        workdir: paths.root.clone(),
        prompt,
        timeout: Duration::from_secs(config.assistant.timeout_secs),
        command_timeout: Duration::from_secs(config.command_timeout_secs),
        output_limit_bytes: config.output_limit_bytes,
    };
    match executor.execute(&request, &mut shell) {
        Ok(reply) => {
            progress::append_section(&paths.root, "Initial analysis", &reply.text)?;
            println!("{}", reply.text.trim());
        }
        Err(err) if err.downcast_ref::<ExecutorUnavailable>().is_some() => {
            progress::append_section(
                &paths.root,
                "Initial analysis",
                "Assistant unavailable during init; analysis skipped.",
            )?;
            eprintln!("assistant unavailable, skipping analysis pass: {err:#}");
        }
        Err(err) => return Err(err),
    }
    Ok(exit_codes::OK)
}

fn cmd_run(
    cli: &Cli,
    dir: &PathBuf,
    iterations: Option<u32>,
    continuous: bool,
    task: Option<String>,
    render_events: bool,
) -> Result<i32> {
    let paths = ProjectPaths::new(dir);
    paths.ensure_initialized()?;
    let config = effective_config(cli, &paths)?;
    let events = EventLogger::new(
        &paths.root,
        session_id("run"),
        render_events,
        config.preview_chars,
    );
    let policy = SecurityPolicy::new()?;
    let engine = PromptEngine::new()?;
    let env = SessionEnv {
        paths: &paths,
        config: &config,
        policy: &policy,
        events: &events,
        engine: &engine,
    };
    let executor = AssistantExecutor::new(config.assistant.clone());

    let max_iterations = match (iterations, continuous) {
        (Some(n), _) => Some(n),
        (None, true) => None,
        (None, false) => Some(1),
    };
    let outcome = run_loop(
        &env,
        &executor,
        &LoopOptions {
            max_iterations,
            pinned_task: task,
        },
    )
    .map_err(describe_schema_error)?;

    let code = match &outcome.stop {
        LoopStop::Done { all_complete } => {
            if *all_complete {
                println!("all tasks complete ({} iterations)", outcome.iterations_run);
            } else {
                println!(
                    "no actionable task left ({} iterations); run `status` to see gated/blocked tasks",
                    outcome.iterations_run
                );
            }
            exit_codes::OK
        }
        LoopStop::Blocked { summary } => {
            eprintln!("session blocked by precheck: {summary}");
            exit_codes::BLOCKED
        }
        LoopStop::LimitReached { max_iterations } => {
            println!("iteration ceiling reached ({max_iterations})");
            exit_codes::OK
        }
        LoopStop::PinnedDone { task_id, status } => {
            match status {
                TaskStatus::Pending => {
                    println!("task {task_id} is not runnable (unmet dependencies)");
                }
                _ => println!("task {task_id} finished as {}", status.as_str()),
            }
            exit_codes::OK
        }
    };
    Ok(code)
}

fn describe_schema_error(err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<SchemaError>().is_some() {
        err.context("task list is invalid; fix tasks.json (no automatic repair)")
    } else {
        err
    }
}

fn cmd_status(dir: &PathBuf, as_json: bool, render_events: bool) -> Result<i32> {
    let paths = ProjectPaths::new(dir);
    paths.ensure_initialized()?;
    let config = load_config(&paths.config)?;
    let events = EventLogger::new(
        &paths.root,
        session_id("status"),
        render_events,
        config.preview_chars,
    );
    events.emit("session_start", "session", "status", json!({}), true);
    let result = print_status(&paths, as_json);
    events.emit(
        "session_end",
        "session",
        "status",
        json!({}),
        result.is_ok(),
    );
    result?;
    Ok(exit_codes::OK)
}

#[allow(clippy::too_many_arguments)]
fn cmd_add_task(
    dir: &PathBuf,
    id: &str,
    name: &str,
    desc: &str,
    priority: Priority,
    verify: &[String],
    depends: &[String],
    render_events: bool,
) -> Result<i32> {
    let paths = ProjectPaths::new(dir);
    paths.ensure_initialized()?;
    let config = load_config(&paths.config)?;
    let events = EventLogger::new(
        &paths.root,
        session_id("add-task"),
        render_events,
        config.preview_chars,
    );
    events.emit(
        "session_start",
        "session",
        "add-task",
        json!({ "id": id }),
        true,
    );
    let result = append_task(&paths, id, name, desc, priority, verify, depends);
    events.emit(
        "session_end",
        "session",
        "add-task",
        json!({ "id": id }),
        result.is_ok(),
    );
    result?;
    println!("added task {id}");
    Ok(exit_codes::OK)
}

fn append_task(
    paths: &ProjectPaths,
    id: &str,
    name: &str,
    desc: &str,
    priority: Priority,
    verify: &[String],
    depends: &[String],
) -> Result<()> {
    let mut list = load_tasks(&paths.tasks)?;
    if list.find(id).is_some() {
        bail!("task id '{id}' already exists");
    }
    for dep in depends {
        if list.find(dep).is_none() {
            bail!("dependency '{dep}' does not exist");
        }
    }
    list.tasks.push(Task {
        id: id.to_string(),
        name: name.to_string(),
        description: desc.to_string(),
        priority,
        verify_commands: verify.to_vec(),
        dependencies: depends.to_vec(),
        ..Task::default()
    });
    list.updated_at = now_stamp();
    save_tasks(&paths.tasks, &list)
}

fn cmd_chat(cli: &Cli, dir: &PathBuf, render_events: bool) -> Result<i32> {
    let paths = ProjectPaths::new(dir);
    paths.ensure_initialized()?;
    let config = effective_config(cli, &paths)?;
    let events = EventLogger::new(
        &paths.root,
        session_id("chat"),
        render_events,
        config.preview_chars,
    );
    let policy = SecurityPolicy::new()?;
    let engine = PromptEngine::new()?;
    let executor = AssistantExecutor::new(config.assistant.clone());

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("flush prompt")?;
        let Some(line) = lines.next() else { break };
        let question = line.context("read stdin")?;
        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        let list = load_tasks(&paths.tasks)?;
        let narrative = progress::load_narrative(
            &paths.root,
            autoloop::io::prompt::NARRATIVE_MAX_CHARS,
        );
        let prompt = engine.render_chat(&list.project_name, list.stats(), &narrative, question)?;
        let mut shell = GatedShell::new(&policy, &events, &paths.root, config.output_limit_bytes);
        let request = ExecRequest {
            workdir: paths.root.clone(),
            prompt,
            timeout: Duration::from_secs(config.assistant.timeout_secs),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        };
        match executor.execute(&request, &mut shell) {
            Ok(reply) => println!("{}", reply.text.trim()),
            Err(err) if err.downcast_ref::<ExecutorUnavailable>().is_some() => {
                eprintln!("assistant unavailable: {err:#}");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_defaults_to_single_iteration_flags() {
        let cli = Cli::parse_from(["autoloop", "run", "proj"]);
        match cli.command {
            Command::Run {
                iterations,
                continuous,
                task,
                ..
            } => {
                assert_eq!(iterations, None);
                assert!(!continuous);
                assert_eq!(task, None);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_run_with_iterations_and_pin() {
        let cli = Cli::parse_from([
            "autoloop", "run", "proj", "-i", "5", "--task", "task-002",
        ]);
        match cli.command {
            Command::Run {
                iterations, task, ..
            } => {
                assert_eq!(iterations, Some(5));
                assert_eq!(task.as_deref(), Some("task-002"));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parse_add_task_with_repeatable_flags() {
        let cli = Cli::parse_from([
            "autoloop",
            "add-task",
            "proj",
            "--id",
            "task-009",
            "--name",
            "Polish",
            "--priority",
            "low",
            "--verify",
            "cargo test",
            "--verify",
            "cargo clippy",
            "--depends",
            "task-001",
        ]);
        match cli.command {
            Command::AddTask {
                id,
                priority,
                verify,
                depends,
                ..
            } => {
                assert_eq!(id, "task-009");
                assert_eq!(priority, Priority::Low);
                assert_eq!(verify, vec!["cargo test", "cargo clippy"]);
                assert_eq!(depends, vec!["task-001"]);
            }
            _ => panic!("expected add-task"),
        }
    }

    #[test]
    fn parse_global_assistant_flags() {
        let cli = Cli::parse_from([
            "autoloop",
            "--model",
            "m1",
            "--base-url",
            "http://h:1/v1",
            "status",
            "proj",
            "--json",
        ]);
        assert_eq!(cli.model.as_deref(), Some("m1"));
        assert_eq!(cli.base_url.as_deref(), Some("http://h:1/v1"));
        match cli.command {
            Command::Status { json, .. } => assert!(json),
            _ => panic!("expected status"),
        }
    }

    #[test]
    fn parse_priority_rejects_unknown_value() {
        assert!(parse_priority("urgent").is_err());
        assert_eq!(parse_priority("high").expect("high"), Priority::High);
    }

    #[test]
    fn status_and_add_task_bracket_session_events() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().to_path_buf();
        let paths = ProjectPaths::new(&dir);
        init_project(&paths, "demo", "demo project", &InitOptions::default()).expect("init");

        cmd_status(&dir, true, false).expect("status");
        cmd_add_task(
            &dir,
            "task-002",
            "Next",
            "",
            Priority::Medium,
            &[],
            &[],
            false,
        )
        .expect("add-task");

        let raw = std::fs::read_to_string(&paths.events).expect("events");
        let types: Vec<String> = raw
            .lines()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).expect("event json");
                value["event_type"].as_str().expect("event_type").to_string()
            })
            .collect();
        assert_eq!(types.iter().filter(|t| *t == "session_start").count(), 2);
        assert_eq!(types.iter().filter(|t| *t == "session_end").count(), 2);
    }
}
