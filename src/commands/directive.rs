//! `phasegate do <instance> [directive...]`
//!
//! With arguments, applies one directive. Without, reads directives from
//! stdin, one per line, applying them in order. Blank lines and `#` comments
//! are ignored. A recoverable error is reported and the stream continues;
//! anything else stops it.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::io::{self, BufRead};

use crate::directive::{Applied, Interpreter, Outcome};
use crate::error::EngineError;
use crate::validation::validate_id;
use crate::workflow::{Engine, Progress};

use super::common::Workspace;
use super::status::print_state;

pub fn execute(instance: String, words: Vec<String>) -> Result<()> {
    validate_id(&instance).context("Invalid instance ID")?;
    let workspace = Workspace::open()?;
    let engine = workspace.engine()?;

    if words.is_empty() {
        let stdin = io::stdin();
        let failed = apply_stream(&engine, &instance, stdin.lock())?;
        if failed > 0 {
            bail!("{failed} directive(s) were rejected");
        }
        return Ok(());
    }

    let line = words.join(" ");
    let applied = Interpreter::new(&engine)
        .apply_line(&instance, &line)
        .map_err(|e| report_error(&line, e))?;
    report(&applied);
    Ok(())
}

/// Apply every directive line from `input`. Returns how many were rejected.
pub fn apply_stream(engine: &Engine, instance: &str, input: impl BufRead) -> Result<usize> {
    let interpreter = Interpreter::new(engine);
    let mut failed = 0;

    for (idx, line) in input.lines().enumerate() {
        let line = line.context("Failed to read directive from stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match interpreter.apply_line(instance, trimmed) {
            Ok(applied) => {
                print!("{} ", format!("{:>3}", idx + 1).dimmed());
                report(&applied);
            }
            Err(e) if e.is_recoverable() => {
                eprintln!(
                    "{} line {}: {} ({})",
                    "✗".red(),
                    idx + 1,
                    e,
                    trimmed.dimmed()
                );
                failed += 1;
            }
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("Directive on line {} failed: {trimmed}", idx + 1));
            }
        }
    }
    Ok(failed)
}

fn report_error(line: &str, err: EngineError) -> anyhow::Error {
    if let EngineError::MalformedDirective { guidance, .. } = &err {
        eprintln!("{guidance}");
    }
    anyhow::Error::new(err).context(format!("Directive '{line}' was not applied"))
}

fn report(applied: &Applied) {
    match &applied.outcome {
        Outcome::Status => print_state(&applied.state),
        Outcome::Help(text) => println!("{}", text.trim_end()),
        Outcome::Progress(Progress::Completed) | Outcome::Progress(Progress::Advanced { to: None, .. }) => {
            println!("{} {}", "✓".green().bold(), applied.outcome);
        }
        Outcome::Progress(
            Progress::Blocked { .. }
            | Progress::GateRejected { .. }
            | Progress::RanUnit {
                status: crate::models::UnitStatus::Failed,
                ..
            },
        ) => println!("{} {}", "✗".red().bold(), applied.outcome),
        Outcome::Progress(
            Progress::AwaitingApproval { .. }
            | Progress::AwaitingSignals { .. }
            | Progress::NeedsExecutor { .. },
        ) => println!("{} {}", "…".yellow(), applied.outcome),
        Outcome::ChangesRequested { .. } | Outcome::GateForced { passed: false, .. } => {
            println!("{} {}", "↺".yellow().bold(), applied.outcome)
        }
        Outcome::GateSkipped {
            overridden: true, ..
        }
        | Outcome::Jumped {
            overridden: true, ..
        } => println!("{} {}", "!".yellow().bold(), applied.outcome),
        _ => println!("{} {}", "✓".green().bold(), applied.outcome),
    }
}
