//! `phasegate templates [template]`

use anyhow::Result;
use colored::Colorize;

use crate::models::GateKind;

use super::common::Workspace;

pub fn list() -> Result<()> {
    let workspace = Workspace::open()?;
    let registry = workspace.templates()?;

    for template in registry.list() {
        println!(
            "{} {} {}",
            template.id.cyan().bold(),
            format!("v{}", template.version).dimmed(),
            template.description.as_deref().unwrap_or("")
        );
        println!("    modes: {}", template.mode_names().join(", "));
    }
    Ok(())
}

pub fn show(id: String) -> Result<()> {
    let workspace = Workspace::open()?;
    let registry = workspace.templates()?;
    let template = registry.get(&id)?;

    println!(
        "{} {}",
        template.id.cyan().bold(),
        format!("v{}", template.version).dimmed()
    );
    for mode in template.mode_names() {
        let phases: Vec<_> = template
            .phases_for_mode(&mode)?
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        let marker = if template.default_mode.as_deref() == Some(mode.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("  mode {mode}{marker}: {}", phases.join(" → "));
    }
    println!();

    for phase in &template.phases {
        println!("  {}", phase.name.as_deref().unwrap_or(&phase.id).bold());
        for unit in &phase.units {
            let optional = if unit.optional { " (optional)" } else { "" };
            println!(
                "    {} {}{optional} {}",
                "○".dimmed(),
                unit.id,
                unit.deliverables.join(", ").dimmed()
            );
        }
        if let Some(gate) = &phase.gate {
            let detail = match &gate.kind {
                GateKind::Human => String::new(),
                GateKind::Auto { signals } => format!(" on {}", signals.join(", ")),
                GateKind::Conditional {
                    signals,
                    override_allowed,
                } => format!(
                    " on {}{}",
                    signals.join(", "),
                    if *override_allowed { ", overridable" } else { "" }
                ),
            };
            println!(
                "    {} {} ({}{detail}{})",
                "gate".dimmed(),
                gate.id,
                gate.kind.approval_type(),
                if gate.required { "" } else { ", optional" }
            );
        }
    }
    if !template.jumps.is_empty() {
        println!();
        for edge in &template.jumps {
            println!("  jump {} → {}", edge.from, edge.to);
        }
    }
    Ok(())
}
