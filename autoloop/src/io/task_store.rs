//! Task list load/save with schema + invariant validation.
//!
//! The store is the only component that persists task data. `save_tasks` is
//! atomic (temp file + rename), so a crash mid-write leaves the previous valid
//! document intact.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;

use crate::tasks::TaskList;

const TASK_LIST_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/task_list/v1.schema.json"
));

/// Fatal: the persisted task list is structurally invalid. Surfaced through
/// anyhow; callers that need to distinguish it use `downcast_ref`.
#[derive(Debug)]
pub struct SchemaError {
    pub details: String,
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task list schema error: {}", self.details)
    }
}

impl std::error::Error for SchemaError {}

fn schema_error(details: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(SchemaError {
        details: details.into(),
    })
}

/// Load and validate the task list (schema, unique ids, legacy migration).
///
/// Structural problems surface as [`SchemaError`]; no silent repair.
pub fn load_tasks(path: &Path) -> Result<TaskList> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read task list {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .map_err(|e| schema_error(format!("unparsable {}: {e}", path.display())))?;
    validate_schema(&value)?;
    let mut list: TaskList = serde_json::from_value(value)
        .map_err(|e| schema_error(format!("deserialize {}: {e}", path.display())))?;
    validate_unique_ids(&list)?;
    for task in &mut list.tasks {
        task.migrate_legacy_fields();
    }
    Ok(list)
}

/// Atomically write the task list (temp file + rename).
pub fn save_tasks(path: &Path, list: &TaskList) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(list).context("serialize task list")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp task list {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace task list {}", path.display()))?;
    Ok(())
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema_value: Value =
        serde_json::from_str(TASK_LIST_SCHEMA).context("parse embedded task list schema")?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(schema_error(messages.join("; ")));
    }
    Ok(())
}

fn validate_unique_ids(list: &TaskList) -> Result<()> {
    let mut seen = HashSet::new();
    for task in &list.tasks {
        if !seen.insert(task.id.as_str()) {
            return Err(schema_error(format!("duplicate task id '{}'", task.id)));
        }
    }
    Ok(())
}
