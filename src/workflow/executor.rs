//! Work-unit invocation boundary

use std::path::PathBuf;
use std::time::Duration;

use crate::error::EngineResult;
use crate::models::UnitStatus;

use super::process::run_shell;

/// What an executor is told about the unit it runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitContext {
    pub instance: String,
    pub loop_id: String,
    pub phase: String,
    pub unit: String,
    /// Deliverable names the unit is expected to produce.
    pub deliverables: Vec<String>,
    /// Feedback from the last changes request on the phase gate.
    pub feedback: Option<String>,
}

/// Result reported back by an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub status: UnitStatus,
    pub deliverables: Vec<String>,
    /// Failure or skip reason.
    pub reason: Option<String>,
}

/// Runs one work unit to completion. From the engine's view this is a
/// single blocking call.
pub trait UnitExecutor {
    fn execute(&self, context: &UnitContext) -> EngineResult<UnitOutcome>;
}

/// Runs a configured shell command per unit.
///
/// The unit is described through `PHASEGATE_*` environment variables. Exit
/// status 0 completes the unit, anything else fails it. Stdout lines of the
/// form `deliverable: <name>` name the produced artifacts.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    command: String,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ShellExecutor {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
            timeout,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn environment(context: &UnitContext) -> Vec<(String, String)> {
        vec![
            ("PHASEGATE_INSTANCE".into(), context.instance.clone()),
            ("PHASEGATE_LOOP".into(), context.loop_id.clone()),
            ("PHASEGATE_PHASE".into(), context.phase.clone()),
            ("PHASEGATE_UNIT".into(), context.unit.clone()),
            (
                "PHASEGATE_DELIVERABLES".into(),
                context.deliverables.join(","),
            ),
            (
                "PHASEGATE_FEEDBACK".into(),
                context.feedback.clone().unwrap_or_default(),
            ),
        ]
    }
}

impl UnitExecutor for ShellExecutor {
    fn execute(&self, context: &UnitContext) -> EngineResult<UnitOutcome> {
        tracing::info!(
            instance = %context.instance,
            phase = %context.phase,
            unit = %context.unit,
            "executing work unit"
        );

        let outcome = run_shell(
            &self.command,
            self.working_dir.as_deref(),
            &Self::environment(context),
            self.timeout,
        )?;

        let deliverables = parse_deliverables(&outcome.stdout);

        if outcome.success {
            return Ok(UnitOutcome {
                status: UnitStatus::Complete,
                deliverables,
                reason: None,
            });
        }

        let reason = if outcome.timed_out {
            format!("timed out after {}s", self.timeout.as_secs())
        } else {
            let detail = outcome
                .stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("")
                .trim()
                .to_string();
            match outcome.exit_code {
                Some(code) if detail.is_empty() => format!("exit code {code}"),
                Some(code) => format!("exit code {code}: {detail}"),
                None => "terminated by signal".to_string(),
            }
        };

        Ok(UnitOutcome {
            status: UnitStatus::Failed,
            deliverables,
            reason: Some(reason),
        })
    }
}

/// Collect `deliverable: <name>` lines, in order, without duplicates.
pub fn parse_deliverables(stdout: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for line in stdout.lines() {
        if let Some(rest) = line.trim().strip_prefix("deliverable:") {
            let name = rest.trim();
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> UnitContext {
        UnitContext {
            instance: "feature-1".into(),
            loop_id: "feature".into(),
            phase: "implement".into(),
            unit: "code".into(),
            deliverables: vec!["src".into(), "tests".into()],
            feedback: Some("split the parser".into()),
        }
    }

    #[test]
    fn test_parse_deliverables() {
        let out = "building\ndeliverable: design.md\n  deliverable:  api.yaml \ndeliverable: design.md\ndeliverable:\n";
        assert_eq!(parse_deliverables(out), vec!["design.md", "api.yaml"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_executor_reports_context_and_deliverables() {
        let executor = ShellExecutor::new(
            "echo \"deliverable: $PHASEGATE_UNIT.out\"; echo \"deliverable: $PHASEGATE_FEEDBACK\"",
            Duration::from_secs(10),
        );
        let outcome = executor.execute(&context()).unwrap();
        assert_eq!(outcome.status, UnitStatus::Complete);
        assert_eq!(outcome.deliverables, vec!["code.out", "split the parser"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_executor_failure_reason() {
        let executor = ShellExecutor::new("echo 'lint broke' >&2; exit 2", Duration::from_secs(10));
        let outcome = executor.execute(&context()).unwrap();
        assert_eq!(outcome.status, UnitStatus::Failed);
        assert_eq!(outcome.reason.as_deref(), Some("exit code 2: lint broke"));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_executor_working_dir() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("marker"), "").unwrap();
        let executor = ShellExecutor::new("test -f marker", Duration::from_secs(10))
            .with_working_dir(temp.path());
        assert_eq!(
            executor.execute(&context()).unwrap().status,
            UnitStatus::Complete
        );
    }
}
