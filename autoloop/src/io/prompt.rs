//! Prompt assembly for assistant invocations.
//!
//! Templates are embedded and rendered with minijinja. Context sections are
//! bounded by fixed character caps rather than token counting, so the pack
//! size stays predictable without a tokenizer.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::tasks::{Task, TaskStats};

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");
const INIT_TEMPLATE: &str = include_str!("prompts/init.md");
const CHAT_TEMPLATE: &str = include_str!("prompts/chat.md");

/// Character caps for context sections.
pub const NARRATIVE_MAX_CHARS: usize = 4000;
pub const PRECHECK_MAX_CHARS: usize = 1500;
pub const HISTORY_MAX_SUBJECTS: usize = 5;
pub const PENDING_MAX_TASKS: usize = 8;

/// Selected task fields exposed to templates.
#[derive(Debug, Clone, Serialize)]
struct TaskContext {
    id: String,
    name: String,
    description: String,
    acceptance_criteria: Vec<String>,
    verify_commands: Vec<String>,
}

impl TaskContext {
    fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            description: task.description.clone(),
            acceptance_criteria: task.acceptance_criteria.clone(),
            verify_commands: task.verify_commands.clone(),
        }
    }
}

/// Everything the task prompt needs, collected by the session before render.
#[derive(Debug, Clone)]
pub struct TaskPromptInputs<'a> {
    pub project_name: &'a str,
    pub tech_stack: &'a str,
    pub stats: TaskStats,
    pub narrative: String,
    pub history: Vec<String>,
    pub precheck_summary: String,
    pub task: &'a Task,
    pub pending: Vec<String>,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("task", TASK_TEMPLATE)?;
        env.add_template("init", INIT_TEMPLATE)?;
        env.add_template("chat", CHAT_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn render_task(&self, input: &TaskPromptInputs<'_>) -> Result<String> {
        let template = self.env.get_template("task")?;
        let narrative = tail_chars(&input.narrative, NARRATIVE_MAX_CHARS);
        let precheck = tail_chars(&input.precheck_summary, PRECHECK_MAX_CHARS);
        let history: Vec<&String> = input.history.iter().take(HISTORY_MAX_SUBJECTS).collect();
        let pending: Vec<&String> = input.pending.iter().take(PENDING_MAX_TASKS).collect();
        let rendered = template.render(context! {
            project_name => input.project_name,
            tech_stack => (!input.tech_stack.is_empty()).then_some(input.tech_stack),
            stats => input.stats,
            narrative => (!narrative.trim().is_empty()).then(|| narrative.trim().to_string()),
            history => (!history.is_empty()).then_some(history),
            precheck => (!precheck.trim().is_empty()).then(|| precheck.trim().to_string()),
            task => TaskContext::from_task(input.task),
            pending => (!pending.is_empty()).then_some(pending),
        })?;
        Ok(rendered)
    }

    pub fn render_init(&self, project_name: &str, spec: &str) -> Result<String> {
        let template = self.env.get_template("init")?;
        Ok(template.render(context! {
            project_name => project_name,
            spec => spec.trim(),
        })?)
    }

    pub fn render_chat(
        &self,
        project_name: &str,
        stats: TaskStats,
        narrative: &str,
        question: &str,
    ) -> Result<String> {
        let template = self.env.get_template("chat")?;
        let narrative = tail_chars(narrative, NARRATIVE_MAX_CHARS);
        Ok(template.render(context! {
            project_name => project_name,
            stats => stats,
            narrative => (!narrative.trim().is_empty()).then(|| narrative.trim().to_string()),
            question => question.trim(),
        })?)
    }
}

fn tail_chars(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    if count <= limit {
        return text.to_string();
    }
    text.chars().skip(count - limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{Task, TaskStats};

    fn sample_task() -> Task {
        Task {
            id: "task-002".to_string(),
            name: "Add parser".to_string(),
            description: "Parse the config format.".to_string(),
            acceptance_criteria: vec!["round-trips sample file".to_string()],
            verify_commands: vec!["cargo test -p parser".to_string()],
            ..Task::default()
        }
    }

    #[test]
    fn task_prompt_names_task_and_verify_commands() {
        let engine = PromptEngine::new().expect("engine");
        let task = sample_task();
        let rendered = engine
            .render_task(&TaskPromptInputs {
                project_name: "demo",
                tech_stack: "rust",
                stats: TaskStats {
                    total: 3,
                    completed: 1,
                    ..TaskStats::default()
                },
                narrative: "did stuff".to_string(),
                history: vec!["feat: bootstrap".to_string()],
                precheck_summary: "passed".to_string(),
                task: &task,
                pending: vec!["task-003: Polish".to_string()],
            })
            .expect("render");
        assert!(rendered.contains("Add parser"));
        assert!(rendered.contains("cargo test -p parser"));
        assert!(rendered.contains("feat: bootstrap"));
        assert!(rendered.contains("1/3 completed"));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let engine = PromptEngine::new().expect("engine");
        let task = sample_task();
        let rendered = engine
            .render_task(&TaskPromptInputs {
                project_name: "demo",
                tech_stack: "",
                stats: TaskStats::default(),
                narrative: String::new(),
                history: Vec::new(),
                precheck_summary: String::new(),
                task: &task,
                pending: Vec::new(),
            })
            .expect("render");
        assert!(!rendered.contains("Progress so far"));
        assert!(!rendered.contains("Recent checkpoints"));
        assert!(!rendered.contains("Upcoming tasks"));
    }

    #[test]
    fn narrative_is_capped_from_the_tail() {
        let engine = PromptEngine::new().expect("engine");
        let task = sample_task();
        let narrative = format!("{}END-MARKER", "x".repeat(NARRATIVE_MAX_CHARS * 2));
        let rendered = engine
            .render_task(&TaskPromptInputs {
                project_name: "demo",
                tech_stack: "",
                stats: TaskStats::default(),
                narrative,
                history: Vec::new(),
                precheck_summary: String::new(),
                task: &task,
                pending: Vec::new(),
            })
            .expect("render");
        assert!(rendered.contains("END-MARKER"));
        assert!(!rendered.contains(&"x".repeat(NARRATIVE_MAX_CHARS + 10)));
    }

    #[test]
    fn init_and_chat_templates_render() {
        let engine = PromptEngine::new().expect("engine");
        let init = engine.render_init("demo", "Build a CLI").expect("init");
        assert!(init.contains("Build a CLI"));
        let chat = engine
            .render_chat("demo", TaskStats::default(), "", "What is left?")
            .expect("chat");
        assert!(chat.contains("What is left?"));
    }
}
