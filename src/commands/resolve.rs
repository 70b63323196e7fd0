//! Resolved-target commands:
//! - `phasegate resolve add <id>...` - Mark targets resolved
//! - `phasegate resolve remove <id>...` - Mark targets unresolved again
//! - `phasegate resolve list` - Show the resolved set

use anyhow::Result;
use colored::Colorize;

use super::common::Workspace;

pub fn add(ids: Vec<String>) -> Result<()> {
    let workspace = Workspace::open()?;
    let added = workspace.resolved_set().add(&ids)?;
    if added.is_empty() {
        println!("{} Already resolved", "ℹ".blue());
    } else {
        println!("{} Resolved {}", "✓".green().bold(), added.join(", ").cyan());
    }
    Ok(())
}

pub fn remove(ids: Vec<String>) -> Result<()> {
    let workspace = Workspace::open()?;
    let removed = workspace.resolved_set().remove(&ids)?;
    if removed.is_empty() {
        println!("{} None of these were resolved", "ℹ".blue());
    } else {
        println!(
            "{} Unresolved {}",
            "✓".green().bold(),
            removed.join(", ").cyan()
        );
    }
    Ok(())
}

pub fn list() -> Result<()> {
    let workspace = Workspace::open()?;
    let resolved = workspace.resolved_set().load()?;
    if resolved.is_empty() {
        println!("{} Nothing resolved yet", "ℹ".blue());
        return Ok(());
    }
    for id in resolved {
        println!("  {} {}", "✓".green(), id);
    }
    Ok(())
}
