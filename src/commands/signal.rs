//! Gate signal commands:
//! - `phasegate signal set <instance> <name> <true|false>` - Record a signal
//! - `phasegate signal show <instance>` - Show recorded and configured signals
//! - `phasegate signal clear <instance>` - Drop recorded signals

use anyhow::{Context, Result};
use colored::Colorize;

use crate::validation::validate_id;

use super::common::Workspace;

pub fn set(instance: String, name: String, value: bool) -> Result<()> {
    validate_id(&name).context("Invalid signal name")?;
    let workspace = Workspace::open()?;
    workspace
        .recorded_signals()
        .record(&instance, &name, value)
        .with_context(|| format!("Failed to record signal '{name}'"))?;

    println!(
        "{} Signal {} = {} for {}",
        "✓".green().bold(),
        name.cyan(),
        if value { "true".green() } else { "false".red() },
        instance
    );
    Ok(())
}

pub fn show(instance: String) -> Result<()> {
    let workspace = Workspace::open()?;
    let recorded = workspace.recorded_signals().load(&instance)?;
    let commands = &workspace.config.signals.commands;

    if recorded.is_empty() && commands.is_empty() {
        println!("{} No signals recorded or configured", "ℹ".blue());
        return Ok(());
    }

    for (name, value) in &recorded {
        println!(
            "  {:20} {} {}",
            name.cyan(),
            if *value { "true".green() } else { "false".red() },
            "(recorded)".dimmed()
        );
    }
    for (name, command) in commands {
        if recorded.contains_key(name) {
            continue;
        }
        println!(
            "  {:20} {} {}",
            name.cyan(),
            "?".yellow(),
            format!("(command: {command})").dimmed()
        );
    }
    Ok(())
}

pub fn clear(instance: String) -> Result<()> {
    let workspace = Workspace::open()?;
    workspace.recorded_signals().clear(&instance)?;
    println!("{} Cleared signals for {}", "✓".green().bold(), instance.cyan());
    Ok(())
}
