//! Task list data model persisted as `tasks.json` at the project root.
//!
//! The task list is the single aggregate the harness schedules from and writes
//! back to. It is read once at the start of an iteration and written at most
//! once at the end; all mutation happens on the in-memory copy.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Timestamp format used in persisted task and event records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current wall-clock time in the persisted timestamp format.
pub fn now_stamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Scheduling priority. Ordering is by urgency: `High` ranks before `Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Rank for stable sorting; lower ranks schedule first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }
}

/// One unit of schedulable work.
///
/// `acceptance_criteria` is advisory prose for the assistant; acceptance is
/// decided solely by the exit codes of `verify_commands`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    /// Legacy single-command field, superseded by `verify_commands`.
    pub test_command: String,
    pub verify_commands: Vec<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub dependencies: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub notes: String,
}

impl Default for Task {
    fn default() -> Self {
        let stamp = now_stamp();
        Self {
            id: String::new(),
            name: String::new(),
            description: String::new(),
            acceptance_criteria: Vec::new(),
            test_command: String::new(),
            verify_commands: Vec::new(),
            priority: Priority::default(),
            status: TaskStatus::default(),
            dependencies: Vec::new(),
            created_at: stamp.clone(),
            updated_at: stamp,
            notes: String::new(),
        }
    }
}

impl Task {
    /// Apply the legacy field migration: an empty `verify_commands` with a
    /// non-empty `test_command` becomes a one-element command list. Applied
    /// once at load time; call sites only ever look at `verify_commands`.
    pub fn migrate_legacy_fields(&mut self) {
        if self.verify_commands.is_empty() && !self.test_command.trim().is_empty() {
            self.verify_commands = vec![self.test_command.clone()];
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_stamp();
    }
}

/// The persisted aggregate: project metadata plus the ordered task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskList {
    pub project_name: String,
    pub tech_stack: String,
    pub init_command: String,
    pub created_at: String,
    pub updated_at: String,
    pub tasks: Vec<Task>,
}

impl Default for TaskList {
    fn default() -> Self {
        let stamp = now_stamp();
        Self {
            project_name: String::new(),
            tech_stack: String::new(),
            init_command: "./init.sh".to_string(),
            created_at: stamp.clone(),
            updated_at: stamp,
            tasks: Vec::new(),
        }
    }
}

impl TaskList {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            ..Self::default()
        }
    }

    pub fn find(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Set a task's status and refresh its timestamp. Returns false if the id
    /// is unknown.
    pub fn set_status(&mut self, id: &str, status: TaskStatus) -> bool {
        match self.find_mut(id) {
            Some(task) => {
                task.status = status;
                task.touch();
                true
            }
            None => false,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_stamp();
    }

    pub fn stats(&self) -> TaskStats {
        let mut stats = TaskStats {
            total: self.tasks.len(),
            ..TaskStats::default()
        };
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Blocked => stats.blocked += 1,
            }
        }
        stats
    }
}

/// Derived per-status totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub blocked: usize,
}

impl TaskStats {
    /// Completion rate in percent, one decimal.
    pub fn completion_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let raw = self.completed as f64 / self.total as f64 * 100.0;
        (raw * 10.0).round() / 10.0
    }
}

/// Bootstrap task seeded by `autoloop init` so a fresh project is runnable.
pub fn seed_task(project_name: &str) -> Task {
    Task {
        id: "task-001".to_string(),
        name: format!("Bootstrap {project_name}"),
        description: "Create the initial project skeleton so that init.sh runs cleanly."
            .to_string(),
        acceptance_criteria: vec!["init.sh exits 0".to_string()],
        verify_commands: vec!["bash ./init.sh".to_string()],
        priority: Priority::High,
        ..Task::default()
    }
}
