//! Deterministic task selection over the task list.

use crate::tasks::{Task, TaskList, TaskStatus};

/// Pick the next actionable task.
///
/// Candidates are pending or in-progress tasks, ordered by priority rank with
/// the original list order as tie-breaker (stable sort). An in-progress task
/// always wins over pending ones; a pending task is eligible only once every
/// dependency id is completed. Returns `None` when nothing is actionable,
/// which covers both "all complete" and "remaining tasks gated".
///
/// Dependency ids that do not exist, and dependency cycles, keep a task
/// permanently ineligible; the scheduler does not diagnose them.
pub fn select_next(list: &TaskList) -> Option<&Task> {
    let mut candidates: Vec<&Task> = list
        .tasks
        .iter()
        .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress))
        .collect();
    candidates.sort_by_key(|t| t.priority.rank());

    if let Some(task) = candidates
        .iter()
        .find(|t| t.status == TaskStatus::InProgress)
    {
        return Some(task);
    }

    candidates
        .into_iter()
        .find(|t| t.status == TaskStatus::Pending && dependencies_completed(list, t))
}

/// True when a task could be selected: in-progress work is always eligible,
/// pending work only once every dependency is completed. Terminal statuses
/// are never eligible. The same rule governs pinned single-task runs.
pub fn is_eligible(list: &TaskList, task: &Task) -> bool {
    match task.status {
        TaskStatus::InProgress => true,
        TaskStatus::Pending => dependencies_completed(list, task),
        TaskStatus::Completed | TaskStatus::Blocked => false,
    }
}

fn dependencies_completed(list: &TaskList, task: &Task) -> bool {
    task.dependencies.iter().all(|dep| {
        list.find(dep)
            .is_some_and(|d| d.status == TaskStatus::Completed)
    })
}

/// Ids of pending tasks whose dependencies are not all completed. Used by
/// status reporting to distinguish "done" from "gated".
pub fn gated_task_ids(list: &TaskList) -> Vec<String> {
    list.tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending && !dependencies_completed(list, t))
        .map(|t| t.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::{Priority, Task};

    fn task(id: &str, priority: Priority, status: TaskStatus, deps: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            name: id.to_string(),
            priority,
            status,
            dependencies: deps.iter().map(|d| (*d).to_string()).collect(),
            ..Task::default()
        }
    }

    fn list_of(tasks: Vec<Task>) -> TaskList {
        TaskList {
            tasks,
            ..TaskList::new("demo")
        }
    }

    #[test]
    fn in_progress_beats_pending_regardless_of_priority() {
        let list = list_of(vec![
            task("a", Priority::High, TaskStatus::Pending, &[]),
            task("b", Priority::Low, TaskStatus::InProgress, &[]),
        ]);
        assert_eq!(select_next(&list).map(|t| t.id.as_str()), Some("b"));
    }

    #[test]
    fn priority_orders_pending_with_stable_tie_break() {
        let list = list_of(vec![
            task("low", Priority::Low, TaskStatus::Pending, &[]),
            task("med-1", Priority::Medium, TaskStatus::Pending, &[]),
            task("med-2", Priority::Medium, TaskStatus::Pending, &[]),
            task("high", Priority::High, TaskStatus::Pending, &[]),
        ]);
        assert_eq!(select_next(&list).map(|t| t.id.as_str()), Some("high"));

        let list = list_of(vec![
            task("med-1", Priority::Medium, TaskStatus::Pending, &[]),
            task("med-2", Priority::Medium, TaskStatus::Pending, &[]),
        ]);
        assert_eq!(select_next(&list).map(|t| t.id.as_str()), Some("med-1"));
    }

    #[test]
    fn pending_with_unmet_dependency_is_skipped() {
        let list = list_of(vec![
            task("base", Priority::Low, TaskStatus::Pending, &[]),
            task("top", Priority::High, TaskStatus::Pending, &["base"]),
        ]);
        assert_eq!(select_next(&list).map(|t| t.id.as_str()), Some("base"));
    }

    #[test]
    fn completed_dependency_unlocks_dependent() {
        let list = list_of(vec![
            task("base", Priority::Low, TaskStatus::Completed, &[]),
            task("top", Priority::High, TaskStatus::Pending, &["base"]),
        ]);
        assert_eq!(select_next(&list).map(|t| t.id.as_str()), Some("top"));
    }

    #[test]
    fn missing_dependency_id_blocks_forever() {
        let list = list_of(vec![task(
            "orphan",
            Priority::High,
            TaskStatus::Pending,
            &["no-such-task"],
        )]);
        assert!(select_next(&list).is_none());
    }

    #[test]
    fn dependency_cycle_yields_none() {
        let list = list_of(vec![
            task("a", Priority::High, TaskStatus::Pending, &["b"]),
            task("b", Priority::High, TaskStatus::Pending, &["a"]),
        ]);
        assert!(select_next(&list).is_none());
        assert_eq!(gated_task_ids(&list), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn select_is_idempotent_without_mutation() {
        let list = list_of(vec![
            task("a", Priority::Medium, TaskStatus::Pending, &[]),
            task("b", Priority::Medium, TaskStatus::Pending, &[]),
        ]);
        let first = select_next(&list).map(|t| t.id.clone());
        let second = select_next(&list).map(|t| t.id.clone());
        assert_eq!(first, second);
    }

    #[test]
    fn all_completed_yields_none_and_no_gated_ids() {
        let list = list_of(vec![task("a", Priority::High, TaskStatus::Completed, &[])]);
        assert!(select_next(&list).is_none());
        assert!(gated_task_ids(&list).is_empty());
    }

    #[test]
    fn blocked_tasks_are_never_candidates() {
        let list = list_of(vec![task("a", Priority::High, TaskStatus::Blocked, &[])]);
        assert!(select_next(&list).is_none());
    }

    #[test]
    fn eligibility_matches_selection_rules() {
        let list = list_of(vec![
            task("base", Priority::High, TaskStatus::Pending, &[]),
            task("gated", Priority::High, TaskStatus::Pending, &["base"]),
            task("resumed", Priority::Low, TaskStatus::InProgress, &["base"]),
            task("done", Priority::High, TaskStatus::Completed, &[]),
        ]);
        let by_id = |id: &str| list.find(id).expect("task exists");
        assert!(is_eligible(&list, by_id("base")));
        assert!(!is_eligible(&list, by_id("gated")));
        // In-progress work resumes even with unmet dependencies.
        assert!(is_eligible(&list, by_id("resumed")));
        assert!(!is_eligible(&list, by_id("done")));
    }
}
