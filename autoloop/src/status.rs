//! Project status reporting for `autoloop status`.

use anyhow::Result;
use serde::Serialize;

use crate::core::scheduler::gated_task_ids;
use crate::io::init::ProjectPaths;
use crate::io::task_store::load_tasks;
use crate::tasks::{TaskList, TaskStats};

/// Machine-readable status document for `status --json`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub project_name: String,
    pub stats: TaskStats,
    pub completion_rate: f64,
    /// Pending tasks whose dependencies are not all completed.
    pub gated: Vec<String>,
    pub tasks: Vec<TaskLine>,
}

#[derive(Debug, Serialize)]
pub struct TaskLine {
    pub id: String,
    pub name: String,
    pub priority: String,
    pub status: String,
    pub dependencies: Vec<String>,
    pub updated_at: String,
}

pub fn build_report(list: &TaskList) -> StatusReport {
    let stats = list.stats();
    StatusReport {
        project_name: list.project_name.clone(),
        completion_rate: stats.completion_rate(),
        gated: gated_task_ids(list),
        stats,
        tasks: list
            .tasks
            .iter()
            .map(|t| TaskLine {
                id: t.id.clone(),
                name: t.name.clone(),
                priority: serde_json::to_value(t.priority)
                    .map(|v| v.as_str().unwrap_or_default().to_string())
                    .unwrap_or_default(),
                status: t.status.as_str().to_string(),
                dependencies: t.dependencies.clone(),
                updated_at: t.updated_at.clone(),
            })
            .collect(),
    }
}

/// Render the report for humans: summary line plus one row per task.
pub fn render_human(report: &StatusReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}: {}/{} completed ({:.1}%), {} in progress, {} blocked\n",
        report.project_name,
        report.stats.completed,
        report.stats.total,
        report.completion_rate,
        report.stats.in_progress,
        report.stats.blocked,
    ));
    for task in &report.tasks {
        let deps = if task.dependencies.is_empty() {
            String::new()
        } else {
            format!("  (deps: {})", task.dependencies.join(", "))
        };
        out.push_str(&format!(
            "  [{:<11}] {:<6} {}  {}{}\n",
            task.status, task.priority, task.id, task.name, deps
        ));
    }
    if !report.gated.is_empty() {
        out.push_str(&format!(
            "gated by unmet dependencies: {}\n",
            report.gated.join(", ")
        ));
    }
    out
}

/// Print status for a project directory, human or JSON.
pub fn print_status(paths: &ProjectPaths, as_json: bool) -> Result<()> {
    paths.ensure_initialized()?;
    let list = load_tasks(&paths.tasks)?;
    let report = build_report(&list);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_human(&report));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{Priority, Task, TaskStatus};

    fn sample() -> TaskList {
        let mut list = TaskList::new("demo");
        list.tasks.push(Task {
            id: "a".to_string(),
            name: "Base".to_string(),
            status: TaskStatus::Completed,
            ..Task::default()
        });
        list.tasks.push(Task {
            id: "b".to_string(),
            name: "Top".to_string(),
            priority: Priority::High,
            dependencies: vec!["a".to_string(), "missing".to_string()],
            ..Task::default()
        });
        list
    }

    #[test]
    fn report_flags_gated_tasks() {
        let report = build_report(&sample());
        assert_eq!(report.stats.total, 2);
        assert_eq!(report.gated, vec!["b".to_string()]);
        assert_eq!(report.completion_rate, 50.0);
    }

    #[test]
    fn human_rendering_lists_every_task() {
        let rendered = render_human(&build_report(&sample()));
        assert!(rendered.contains("demo: 1/2 completed (50.0%)"));
        assert!(rendered.contains("Base"));
        assert!(rendered.contains("deps: a, missing"));
        assert!(rendered.contains("gated by unmet dependencies: b"));
    }

    #[test]
    fn json_report_serializes_priority_names() {
        let report = build_report(&sample());
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["tasks"][1]["priority"], "high");
        assert_eq!(value["tasks"][0]["status"], "completed");
    }
}
