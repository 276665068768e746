//! Verification gate: run a task's verify commands and judge by exit code only.

use std::time::Duration;

use anyhow::Result;

use crate::io::shell::{CommandHost, CommandRequest, CommandResult};

/// Verdict over an ordered list of verify commands.
///
/// Fail-fast: commands after the first failure are never run. An empty list is
/// vacuously passing (no verification required is equivalent to no gate).
#[derive(Debug)]
pub struct VerificationResult {
    pub ok: bool,
    pub results: Vec<CommandResult>,
    pub first_failure_index: Option<usize>,
    /// True when there were no commands to run.
    pub vacuous: bool,
}

impl VerificationResult {
    /// Short summary string for run records ("passed", "vacuous", "failed@1").
    pub fn summary(&self) -> String {
        if self.vacuous {
            return "vacuous".to_string();
        }
        match self.first_failure_index {
            None => "passed".to_string(),
            Some(index) => format!("failed@{index}"),
        }
    }
}

/// Run the commands in order through the gated shell. Output is captured for
/// the record but never inspected; acceptance is exit-code only.
pub fn run_verification(
    shell: &mut dyn CommandHost,
    commands: &[String],
    timeout: Duration,
) -> Result<VerificationResult> {
    if commands.is_empty() {
        return Ok(VerificationResult {
            ok: true,
            results: Vec::new(),
            first_failure_index: None,
            vacuous: true,
        });
    }

    let mut results = Vec::new();
    for (index, command) in commands.iter().enumerate() {
        let result = shell.run(&CommandRequest {
            command: command.clone(),
            timeout,
        })?;
        let failed = !result.ok();
        results.push(result);
        if failed {
            return Ok(VerificationResult {
                ok: false,
                results,
                first_failure_index: Some(index),
                vacuous: false,
            });
        }
    }

    Ok(VerificationResult {
        ok: true,
        results,
        first_failure_index: None,
        vacuous: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingShell;

    fn cmds(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| (*c).to_string()).collect()
    }

    #[test]
    fn empty_list_is_vacuously_ok() {
        let mut shell = RecordingShell::passing();
        let result =
            run_verification(&mut shell, &[], Duration::from_secs(5)).expect("verify");
        assert!(result.ok);
        assert!(result.vacuous);
        assert_eq!(result.summary(), "vacuous");
        assert!(shell.commands.is_empty());
    }

    #[test]
    fn stops_at_first_failure() {
        let mut shell = RecordingShell::with_exit_codes(vec![0, 1, 0]);
        let result = run_verification(
            &mut shell,
            &cmds(&["ok-1", "fails", "never-runs"]),
            Duration::from_secs(5),
        )
        .expect("verify");
        assert!(!result.ok);
        assert_eq!(result.first_failure_index, Some(1));
        assert_eq!(result.results.len(), 2);
        assert_eq!(shell.commands, vec!["ok-1", "fails"]);
        assert_eq!(result.summary(), "failed@1");
    }

    #[test]
    fn all_passing_runs_everything() {
        let mut shell = RecordingShell::passing();
        let result = run_verification(
            &mut shell,
            &cmds(&["a", "b", "c"]),
            Duration::from_secs(5),
        )
        .expect("verify");
        assert!(result.ok);
        assert!(!result.vacuous);
        assert_eq!(result.results.len(), 3);
        assert_eq!(result.summary(), "passed");
    }
}
