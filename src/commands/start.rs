//! `phasegate start <template> [--mode <mode>]`

use anyhow::{Context, Result};
use colored::Colorize;

use super::common::Workspace;

pub fn execute(template: String, mode: Option<String>) -> Result<()> {
    let workspace = Workspace::open()?;
    let engine = workspace.engine()?;

    let state = engine
        .initialize(&template, mode.as_deref())
        .with_context(|| format!("Failed to start workflow from template '{template}'"))?;

    println!(
        "{} Started {} ({} v{}, mode {})",
        "✓".green().bold(),
        state.id.cyan().bold(),
        state.loop_id,
        state.template_version,
        state.mode
    );
    if let Some(phase) = state.active_phase() {
        println!("  Phase: {}", phase.display_name().yellow());
        for unit in &phase.units {
            println!("    {} {}", "○".dimmed(), unit.id);
        }
    }
    println!(
        "  {} Drive it with {}",
        "→".dimmed(),
        format!("phasegate do {} continue", state.id).cyan()
    );
    Ok(())
}
