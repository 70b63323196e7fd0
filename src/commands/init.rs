//! `phasegate init`

use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::Path;

use crate::fs::config::DEFAULT_CONFIG;
use crate::fs::work_dir::{WorkDir, WORK_DIR_NAME};

/// Create `.phasegate/` with the default configuration in the current
/// directory.
pub fn execute() -> Result<()> {
    let root = std::env::current_dir().context("Failed to get current directory")?;
    initialize_at(&root)?;

    println!(
        "{} Initialized {} in {}",
        "✓".green().bold(),
        WORK_DIR_NAME.cyan(),
        root.display()
    );
    println!(
        "  {} Edit {} to configure the executor, signals and scoring",
        "→".dimmed(),
        format!("{WORK_DIR_NAME}/config.toml").dimmed()
    );
    println!(
        "  {} Start a workflow with {}",
        "→".dimmed(),
        "phasegate start <template>".cyan()
    );
    Ok(())
}

pub fn initialize_at(root: &Path) -> Result<WorkDir> {
    let work_dir = WorkDir::new(root);
    work_dir.initialize()?;
    fs::write(work_dir.config_path(), DEFAULT_CONFIG).context("Failed to write config.toml")?;
    tracing::info!(root = %root.display(), "initialized work directory");
    Ok(work_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::config::Config;
    use tempfile::TempDir;

    #[test]
    fn test_initialize_writes_default_config() {
        let temp = TempDir::new().unwrap();
        let work_dir = initialize_at(temp.path()).unwrap();

        let config = Config::load(&work_dir.config_path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(initialize_at(temp.path()).is_err());
    }
}
