//! Checkpoint adapter: commit accepted progress, never fail the session.

use std::path::Path;

use tracing::{debug, warn};

use crate::io::git::Git;
use crate::tasks::TaskStatus;

/// Result of one checkpoint attempt. Failures are data, not errors: loss of
/// checkpointing must not halt the iteration loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// Changes were staged and committed.
    Committed,
    /// The working tree was clean; nothing to commit.
    Clean,
    /// Checkpointing was unavailable or failed.
    Skipped { reason: String },
}

impl CheckpointOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    /// False only when checkpointing failed or was unavailable; a clean tree
    /// is a normal outcome.
    pub fn ok(&self) -> bool {
        !matches!(self, Self::Skipped { .. })
    }

    /// Human-readable outcome for run records and events.
    pub fn describe(&self) -> String {
        match self {
            Self::Committed => "committed".to_string(),
            Self::Clean => "no changes".to_string(),
            Self::Skipped { reason } => reason.clone(),
        }
    }
}

/// Conventional commit subject for an iteration outcome.
pub fn commit_message(task_name: &str, status: TaskStatus) -> String {
    match status {
        TaskStatus::Completed => format!("feat: {task_name}"),
        _ => format!("wip: {task_name}"),
    }
}

/// Commit everything in the working tree under `message`, if anything changed.
pub fn checkpoint(project_dir: &Path, message: &str) -> CheckpointOutcome {
    let git = Git::new(project_dir);
    if !git.is_repo() {
        return CheckpointOutcome::skipped("not a git repository");
    }
    match try_commit(&git, message) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(err = %e, "checkpoint failed");
            CheckpointOutcome::skipped(format!("git error: {e:#}"))
        }
    }
}

fn try_commit(git: &Git, message: &str) -> anyhow::Result<CheckpointOutcome> {
    if !git.has_changes()? {
        debug!("working tree clean, nothing to checkpoint");
        return Ok(CheckpointOutcome::Clean);
    }
    git.add_all()?;
    if git.commit_staged(message)? {
        Ok(CheckpointOutcome::Committed)
    } else {
        Ok(CheckpointOutcome::skipped("nothing staged"))
    }
}

/// Recent checkpoint subjects for the execution context; empty outside a repo.
pub fn recent_history(project_dir: &Path, count: usize) -> Vec<String> {
    let git = Git::new(project_dir);
    if !git.is_repo() {
        return Vec::new();
    }
    git.recent_subjects(count).unwrap_or_default()
}
