//! Progress narrative: `progress.md` at the project root.
//!
//! Human-readable history of what each iteration did, appended to by the
//! session and fed back into the next prompt so the assistant keeps context
//! across sessions.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::tasks::now_stamp;

const PROGRESS_FILE: &str = "progress.md";

/// Create the initial narrative document. Overwrites nothing if it exists.
pub fn init_progress(project_dir: &Path, project_name: &str, spec: &str) -> Result<()> {
    let path = project_dir.join(PROGRESS_FILE);
    if path.exists() {
        return Ok(());
    }
    let contents = format!(
        "# {project_name} progress\n\nStarted: {}\n\n## Specification\n\n{spec}\n",
        now_stamp()
    );
    std::fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
}

/// Append one iteration section to the narrative.
pub fn append_section(project_dir: &Path, title: &str, body: &str) -> Result<()> {
    let path = project_dir.join(PROGRESS_FILE);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open {}", path.display()))?;
    writeln!(file, "\n## {} ({})\n\n{}", title, now_stamp(), body.trim())
        .with_context(|| format!("append {}", path.display()))?;
    Ok(())
}

/// Load the narrative, keeping only the last `max_chars` characters so the
/// prompt stays bounded. Missing file reads as empty.
pub fn load_narrative(project_dir: &Path, max_chars: usize) -> String {
    let path = project_dir.join(PROGRESS_FILE);
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return String::new();
    };
    let count = contents.chars().count();
    if count <= max_chars {
        return contents;
    }
    contents
        .chars()
        .skip(count - max_chars)
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_progress(temp.path(), "demo", "Build a thing").expect("init");
        append_section(temp.path(), "Iteration 1", "did work").expect("append");
        init_progress(temp.path(), "demo", "Different spec").expect("init again");
        let narrative = load_narrative(temp.path(), 10_000);
        assert!(narrative.contains("Build a thing"));
        assert!(narrative.contains("Iteration 1"));
        assert!(!narrative.contains("Different spec"));
    }

    #[test]
    fn narrative_is_tail_bounded() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_progress(temp.path(), "demo", &"x".repeat(500)).expect("init");
        let tail = load_narrative(temp.path(), 100);
        assert_eq!(tail.chars().count(), 100);
    }

    #[test]
    fn missing_file_reads_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(load_narrative(temp.path(), 100), "");
    }
}
