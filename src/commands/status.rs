//! `phasegate status [instance] [--json]`

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};

use crate::models::{ExecutionState, GateStatus, PhaseStatus, UnitStatus};

use super::common::{truncate, Workspace};

pub fn execute(instance: Option<String>, json: bool) -> Result<()> {
    let workspace = Workspace::open()?;
    let engine = workspace.engine()?;

    match instance {
        Some(id) => {
            let state = engine
                .load(&id)
                .with_context(|| format!("Failed to load instance '{id}'"))?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&state).context("Failed to encode state")?
                );
            } else {
                print_state(&state);
            }
        }
        None => {
            let states = engine.store().list()?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&states).context("Failed to encode states")?
                );
            } else {
                print_list(&states);
            }
        }
    }
    Ok(())
}

fn print_list(states: &[ExecutionState]) {
    if states.is_empty() {
        println!("{} No workflow instances", "ℹ".blue());
        return;
    }

    println!(
        "{:40} {:10} {:8} {:14} {:>8}",
        "INSTANCE".bold(),
        "TEMPLATE".bold(),
        "MODE".bold(),
        "PHASE".bold(),
        "PROGRESS".bold()
    );
    println!("{}", "─".repeat(84));

    for state in states {
        let (_, _, complete) = state.progress();
        let phase = match &state.current_phase {
            Some(p) if state.is_suspended() => format!("{p} (paused)").yellow(),
            Some(p) => p.normal(),
            None => "complete".green(),
        };
        println!(
            "{:40} {:10} {:8} {:14} {:>8}",
            truncate(&state.id, 40).cyan(),
            truncate(&state.loop_id, 10),
            truncate(&state.mode, 8),
            phase,
            format!("{complete}/{}", state.phases.len())
        );
    }
}

fn phase_marker(status: PhaseStatus) -> ColoredString {
    match status {
        PhaseStatus::Pending => "○".dimmed(),
        PhaseStatus::Active => "●".yellow().bold(),
        PhaseStatus::Complete => "✓".green(),
    }
}

fn unit_status(status: UnitStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        UnitStatus::Pending => text.dimmed(),
        UnitStatus::Running => text.yellow(),
        UnitStatus::Complete => text.green(),
        UnitStatus::Skipped => text.blue(),
        UnitStatus::Failed => text.red().bold(),
    }
}

fn gate_status(status: GateStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        GateStatus::Pending => text.yellow(),
        GateStatus::Passed => text.green(),
        GateStatus::Rejected => text.red().bold(),
    }
}

/// Human-readable view of one instance.
pub fn print_state(state: &ExecutionState) {
    println!(
        "{} {} v{} · mode {} · revision {}",
        state.id.cyan().bold(),
        state.loop_id,
        state.template_version,
        state.mode,
        state.revision
    );
    if let Some(point) = &state.suspended {
        print!("  {} paused {}", "⏸".yellow(), point.at.format("%Y-%m-%d %H:%M:%SZ"));
        if let Some(note) = &point.note {
            print!(": {note}");
        }
        println!();
    }
    if let Some(done) = state.completed_at {
        println!("  {} completed {}", "✓".green(), done.format("%Y-%m-%d %H:%M:%SZ"));
    }
    println!();

    for phase in &state.phases {
        println!(
            "{} {} {}",
            phase_marker(phase.status),
            phase.display_name().bold(),
            format!("[{}]", phase.status).dimmed()
        );
        for unit in &phase.units {
            let mut line = format!("    {:24} {}", unit.id, unit_status(unit.status));
            if unit.optional {
                line.push_str(&format!(" {}", "(optional)".dimmed()));
            }
            if let Some(reason) = &unit.reason {
                line.push_str(&format!(" {}", truncate(reason, 60).dimmed()));
            }
            println!("{line}");
        }
        if let Some(gate) = &phase.gate {
            print!(
                "    {} {} ({}{}) {}",
                "gate".dimmed(),
                gate.id,
                gate.kind.approval_type(),
                if gate.required { "" } else { ", optional" },
                gate_status(gate.status)
            );
            if let Some(feedback) = &gate.feedback {
                print!(" {}", truncate(feedback, 60).italic());
            }
            if let Some(waived) = &gate.waived {
                print!(" {}", format!("waived: {}", truncate(waived, 50)).dimmed());
            }
            println!();
        }
    }

    let overrides = state.audit.iter().filter(|a| a.overridden).count();
    if overrides > 0 {
        println!();
        println!(
            "{} {overrides} audited override(s); see the instance file for details",
            "!".yellow().bold()
        );
    }
}
