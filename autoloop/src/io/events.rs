//! Structured event log: `events.jsonl` in the project directory.
//!
//! One record per observable action (phase transition, tool invocation, tool
//! result, security decision). Append-only, flushed per line so a crash loses
//! at most the in-flight event. Dual-rendered: when verbose, each event also
//! prints a component-tagged console line.
//!
//! There is no ambient global logger; the `EventLogger` travels inside the
//! session context and is passed to whatever needs to emit.

use std::cell::{Cell, RefCell};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::tasks::now_stamp;

/// Payload keys masked before persisting. Matched as substrings, case-insensitive.
const SECRET_KEY_MARKERS: &[&str] = &["token", "password", "secret", "api_key"];

/// One line of `events.jsonl`. Field set is a stable external contract.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub timestamp: String,
    pub session_id: String,
    pub iteration: u32,
    pub phase: String,
    pub event_type: String,
    pub component: String,
    pub name: String,
    pub payload: Value,
    pub ok: bool,
}

/// Append-only event sink bound to one session.
///
/// The iteration/phase cursor uses interior mutability so the logger can be
/// shared immutably with the command host while the session advances phases.
#[derive(Debug)]
pub struct EventLogger {
    path: PathBuf,
    session_id: String,
    iteration: Cell<u32>,
    phase: RefCell<String>,
    verbose: bool,
    preview_chars: usize,
}

impl EventLogger {
    pub fn new(
        project_dir: &Path,
        session_id: impl Into<String>,
        verbose: bool,
        preview_chars: usize,
    ) -> Self {
        Self {
            path: project_dir.join("events.jsonl"),
            session_id: session_id.into(),
            iteration: Cell::new(0),
            phase: RefCell::new("idle".to_string()),
            verbose,
            preview_chars,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn set_iteration(&self, iteration: u32) {
        self.iteration.set(iteration);
    }

    pub fn set_phase(&self, phase: &str) {
        *self.phase.borrow_mut() = phase.to_string();
    }

    /// Record a phase transition as its own event.
    pub fn phase(&self, phase: &str) {
        self.set_phase(phase);
        self.emit("phase", "session", phase, json!({}), true);
    }

    /// Append one event; logging failures are reported via tracing and
    /// swallowed so the loop never dies on a full disk.
    pub fn emit(&self, event_type: &str, component: &str, name: &str, payload: Value, ok: bool) {
        let event = Event {
            timestamp: now_stamp(),
            session_id: self.session_id.clone(),
            iteration: self.iteration.get(),
            phase: self.phase.borrow().clone(),
            event_type: event_type.to_string(),
            component: component.to_string(),
            name: name.to_string(),
            payload: sanitize(payload, self.preview_chars),
            ok,
        };
        if let Err(e) = self.append(&event) {
            warn!(err = %e, "failed to append event");
        }
        if self.verbose {
            println!("{}", render_console_line(&event));
        }
    }

    fn append(&self, event: &Event) -> Result<()> {
        let line = serde_json::to_string(event).context("serialize event")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        writeln!(file, "{line}").context("append event line")?;
        file.flush().context("flush event line")?;
        Ok(())
    }
}

/// Mask secret-looking keys and truncate long string values to a preview.
fn sanitize(value: Value, preview_chars: usize) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, val)| {
                    if is_secret_key(&key) {
                        (key, Value::String("***".to_string()))
                    } else {
                        (key, sanitize(val, preview_chars))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| sanitize(item, preview_chars))
                .collect(),
        ),
        Value::String(s) => Value::String(preview(&s, preview_chars)),
        other => other,
    }
}

fn is_secret_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    SECRET_KEY_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Truncate to `limit` chars, appending a count of what was dropped.
pub fn preview(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    if count <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit).collect();
    format!("{kept}...(+{} chars)", count - limit)
}

fn render_console_line(event: &Event) -> String {
    let tag = match event.event_type.as_str() {
        "tool_call" => "[tool-call]",
        "tool_result" => "[tool-result]",
        "assistant_text" => "[assistant]",
        _ => "[session]",
    };
    let marker = if event.ok { "" } else { " !" };
    format!(
        "{tag} iter={} {}/{}{marker}",
        event.iteration, event.component, event.name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn appends_jsonl_with_exact_field_set() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logger = EventLogger::new(temp.path(), "run-20260830120000", false, 300);
        logger.set_iteration(2);
        logger.phase("verifying");
        logger.emit("tool_call", "shell", "bash", json!({"command": "ls"}), true);

        let raw = std::fs::read_to_string(temp.path().join("events.jsonl")).expect("read");
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);

        let record: Value = serde_json::from_str(lines[1]).expect("parse");
        let obj = record.as_object().expect("object");
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "component",
                "event_type",
                "iteration",
                "name",
                "ok",
                "payload",
                "phase",
                "session_id",
                "timestamp"
            ]
        );
        assert_eq!(record["iteration"], 2);
        assert_eq!(record["phase"], "verifying");
        assert_eq!(record["payload"]["command"], "ls");
    }

    #[test]
    fn masks_secret_keys_recursively() {
        let sanitized = sanitize(
            json!({
                "api_key": "sk-123",
                "nested": {"Password": "hunter2", "note": "fine"},
                "items": [{"auth_token": "abc"}]
            }),
            300,
        );
        assert_eq!(sanitized["api_key"], "***");
        assert_eq!(sanitized["nested"]["Password"], "***");
        assert_eq!(sanitized["nested"]["note"], "fine");
        assert_eq!(sanitized["items"][0]["auth_token"], "***");
    }

    #[test]
    fn previews_long_strings() {
        let long = "x".repeat(320);
        let shown = preview(&long, 300);
        assert!(shown.starts_with(&"x".repeat(300)));
        assert!(shown.ends_with("...(+20 chars)"));
        assert_eq!(preview("short", 300), "short");
    }
}
