//! Archive commands:
//! - `phasegate archive list` - List completed snapshots
//! - `phasegate archive verify` - Recheck every snapshot digest

use anyhow::{bail, Result};
use colored::Colorize;

use super::common::Workspace;

pub fn list() -> Result<()> {
    let workspace = Workspace::open()?;
    let snapshots = workspace.archive().list()?;
    if snapshots.is_empty() {
        println!("{} No archived workflows", "ℹ".blue());
        return Ok(());
    }

    println!(
        "{:40} {:10} {:8} {:20} {:>7}",
        "INSTANCE".bold(),
        "TEMPLATE".bold(),
        "MODE".bold(),
        "COMPLETED".bold(),
        "OUTPUTS".bold()
    );
    println!("{}", "─".repeat(87));
    for (_, manifest) in &snapshots {
        println!(
            "{:40} {:10} {:8} {:20} {:>7}",
            manifest.instance.cyan(),
            manifest.loop_id,
            manifest.mode,
            manifest.completed_at.format("%Y-%m-%d %H:%M:%SZ"),
            manifest.deliverables.len()
        );
    }
    Ok(())
}

pub fn verify() -> Result<()> {
    let workspace = Workspace::open()?;
    let archive = workspace.archive();
    let mut corrupted = 0;

    for (path, manifest) in archive.list()? {
        if archive.verify(&path)? {
            println!("  {} {}", "✓".green(), manifest.instance);
        } else {
            println!(
                "  {} {} digest mismatch in {}",
                "✗".red().bold(),
                manifest.instance,
                path.display()
            );
            corrupted += 1;
        }
    }

    if corrupted > 0 {
        bail!("{corrupted} archived snapshot(s) failed verification");
    }
    Ok(())
}
