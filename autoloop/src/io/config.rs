//! Harness configuration stored as `autoloop.toml` at the project root.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Harness configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values; a missing file is
/// equivalent to all defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Timeout for individual assistant-requested shell commands, in seconds.
    pub command_timeout_secs: u64,

    /// Timeout for the session precheck script (`init.sh`), in seconds.
    pub precheck_timeout_secs: u64,

    /// Timeout for each verification command, in seconds.
    pub verify_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Iteration ceiling for continuous mode.
    pub max_iterations: u32,

    /// Preview length (chars) for output excerpts in events and run records.
    pub preview_chars: usize,

    pub assistant: AssistantConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssistantConfig {
    /// Command to launch the assistant (argv; the rendered prompt is piped to
    /// stdin and the reply is read from stdout).
    pub command: Vec<String>,

    /// Model name forwarded to the assistant.
    pub model: String,

    /// OpenAI-compatible endpoint forwarded to the assistant.
    pub base_url: String,

    /// Timeout for one assistant invocation, in seconds.
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            command: vec!["assistant".to_string(), "exec".to_string()],
            model: "qwen3-coder:30b".to_string(),
            base_url: "http://localhost:11434/v1".to_string(),
            timeout_secs: 30 * 60,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 60,
            precheck_timeout_secs: 120,
            verify_timeout_secs: 300,
            output_limit_bytes: 100_000,
            max_iterations: 100,
            preview_chars: 300,
            assistant: AssistantConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.precheck_timeout_secs == 0 {
            return Err(anyhow!("precheck_timeout_secs must be > 0"));
        }
        if self.verify_timeout_secs == 0 {
            return Err(anyhow!("verify_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.assistant.command.is_empty() || self.assistant.command[0].trim().is_empty() {
            return Err(anyhow!("assistant.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HarnessConfig::default()`.
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        let cfg = HarnessConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HarnessConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &HarnessConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
