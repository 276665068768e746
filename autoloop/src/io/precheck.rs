//! Session precheck: run the project's `init.sh` health script if present.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use crate::io::events::preview;
use crate::io::shell::{CommandHost, CommandRequest};

/// Script the precheck looks for at the project root.
pub const PRECHECK_SCRIPT: &str = "init.sh";

/// Outcome of the precheck phase. A missing script is a pass, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecheckOutcome {
    pub ok: bool,
    pub ran: bool,
    pub summary: String,
}

impl PrecheckOutcome {
    fn skipped() -> Self {
        Self {
            ok: true,
            ran: false,
            summary: "no precheck script".to_string(),
        }
    }
}

/// Run `bash ./init.sh` through the gated shell. Exit 0 passes; nonzero blocks
/// the iteration before any task is selected.
pub fn run_precheck(
    shell: &mut dyn CommandHost,
    project_dir: &Path,
    timeout: Duration,
    preview_chars: usize,
) -> Result<PrecheckOutcome> {
    if !project_dir.join(PRECHECK_SCRIPT).is_file() {
        return Ok(PrecheckOutcome::skipped());
    }
    let result = shell.run(&CommandRequest {
        command: format!("bash ./{PRECHECK_SCRIPT}"),
        timeout,
    })?;
    let summary = if result.ok() {
        format!("passed: {}", preview(result.stdout.trim(), preview_chars))
    } else if result.timed_out {
        "timed out".to_string()
    } else {
        format!(
            "exit {}: {}",
            result.exit_code,
            preview(result.stderr.trim(), preview_chars)
        )
    };
    Ok(PrecheckOutcome {
        ok: result.ok(),
        ran: true,
        summary,
    })
}
