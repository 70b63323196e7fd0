//! `phasegate unit <instance> <unit> <status>`
//!
//! Records a unit result reported from outside the engine, for workflows
//! without a configured executor.

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::models::UnitStatus;
use crate::validation::{validate_id, validate_reason};

use super::common::Workspace;

pub fn execute(
    instance: String,
    unit: String,
    status: String,
    reason: Option<String>,
    produced: Vec<String>,
) -> Result<()> {
    validate_id(&unit).context("Invalid unit ID")?;
    let status: UnitStatus = status.parse()?;
    if let Some(reason) = &reason {
        validate_reason(reason).context("Invalid reason")?;
    }
    if status == UnitStatus::Skipped && reason.is_none() {
        bail!("Skipping unit '{unit}' requires --reason");
    }

    let workspace = Workspace::open()?;
    let engine = workspace.engine()?;

    let _guard = engine.store().lock(&instance)?;
    let state = engine
        .load(&instance)
        .with_context(|| format!("Failed to load instance '{instance}'"))?;
    let state = engine.record_unit_status(&state, &unit, status, reason, produced)?;

    println!(
        "{} Unit {} is now {}",
        "✓".green().bold(),
        unit.cyan(),
        status.to_string().bold()
    );
    if let Some(phase) = state.active_phase() {
        let outstanding = phase.outstanding_units();
        if outstanding.is_empty() {
            println!(
                "  {} Required units of {} are done",
                "→".dimmed(),
                phase.display_name().yellow()
            );
        } else {
            println!("  Outstanding: {}", outstanding.join(", ").dimmed());
        }
    }
    Ok(())
}
