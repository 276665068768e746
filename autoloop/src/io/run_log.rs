//! Per-iteration run records: `run_log.jsonl` in the project directory.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::tasks::now_stamp;

/// One line of `run_log.jsonl`, appended after every iteration and immutable
/// once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub timestamp: String,
    pub session_id: String,
    pub iteration: u32,
    /// Selected task id, empty when nothing was eligible.
    pub task_id: String,
    /// Task status after the iteration (or the iteration outcome when no task
    /// was selected: `done`, `blocked`).
    pub status: String,
    pub precheck: String,
    pub verified: String,
    pub checkpoint: String,
    pub output_preview: String,
}

impl IterationRecord {
    pub fn new(session_id: &str, iteration: u32) -> Self {
        Self {
            timestamp: now_stamp(),
            session_id: session_id.to_string(),
            iteration,
            task_id: String::new(),
            status: String::new(),
            precheck: String::new(),
            verified: String::new(),
            checkpoint: String::new(),
            output_preview: String::new(),
        }
    }
}

/// Append one record. Run-log write failures must never abort the loop; the
/// caller logs and continues.
pub fn append_record(project_dir: &Path, record: &IterationRecord) -> Result<()> {
    let path = project_dir.join("run_log.jsonl");
    let line = serde_json::to_string(record).context("serialize iteration record")?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    writeln!(file, "{line}").context("append iteration record")?;
    file.flush().context("flush iteration record")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut record = IterationRecord::new("run-20260830120000", 1);
        record.task_id = "task-001".to_string();
        record.status = "completed".to_string();
        record.verified = "passed".to_string();
        append_record(temp.path(), &record).expect("append");
        append_record(temp.path(), &record).expect("append");

        let raw = std::fs::read_to_string(temp.path().join("run_log.jsonl")).expect("read");
        assert_eq!(raw.lines().count(), 2);
        let parsed: IterationRecord = serde_json::from_str(raw.lines().next().expect("line"))
            .expect("parse");
        assert_eq!(parsed.task_id, "task-001");
    }
}
