use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const WORK_DIR_NAME: &str = ".phasegate";

const INSTANCES: &str = "instances";
const ARCHIVE: &str = "archive";
const SIGNALS: &str = "signals";
const TEMPLATES: &str = "templates";
const LOCKS: &str = "locks";

const LAYOUT: [&str; 5] = [INSTANCES, ARCHIVE, SIGNALS, TEMPLATES, LOCKS];

const README: &str = "\
# phasegate work directory

Managed by the phasegate CLI.

- `config.toml`: queue, gate policy, executor, signal and scoring settings
- `instances/`: live workflow state, one markdown file per instance
- `archive/`: immutable snapshots of completed instances
- `signals/`: recorded gate signals per instance
- `templates/`: user workflow templates, overriding built-ins by id
- `locks/`: per-instance directive locks
- `queue.toml`: the current execution queue
- `resolved.toml`: targets the blocker check treats as resolved

Edit `config.toml` and `templates/` freely. The rest is rewritten by
phasegate under file locks.
";

/// Layout of the `.phasegate/` directory.
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root: project_root.as_ref().join(WORK_DIR_NAME),
        }
    }

    /// Create the directory tree. Fails if it already exists.
    pub fn initialize(&self) -> Result<()> {
        if self.root.exists() {
            bail!("{} already exists", self.root.display());
        }
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        self.ensure_layout()?;
        fs::write(self.root.join("README.md"), README).context("Failed to write README.md")?;
        Ok(())
    }

    /// Check an existing work directory, recreating missing subdirectories.
    pub fn load(&self) -> Result<()> {
        if !self.root.is_dir() {
            bail!("No {WORK_DIR_NAME} directory here. Run 'phasegate init' first.");
        }
        self.ensure_layout()
    }

    fn ensure_layout(&self) -> Result<()> {
        for name in LAYOUT {
            let dir = self.root.join(name);
            if !dir.is_dir() {
                fs::create_dir(&dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
        }
        Ok(())
    }

    pub fn instances_dir(&self) -> PathBuf {
        self.root.join(INSTANCES)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE)
    }

    pub fn signals_dir(&self) -> PathBuf {
        self.root.join(SIGNALS)
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join(TEMPLATES)
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(LOCKS)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn queue_path(&self) -> PathBuf {
        self.root.join("queue.toml")
    }

    pub fn resolved_path(&self) -> PathBuf {
        self.root.join("resolved.toml")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding `.phasegate/`.
    pub fn project_root(&self) -> Option<&Path> {
        self.root.parent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_initialize_creates_layout() {
        let temp = TempDir::new().unwrap();
        let work_dir = WorkDir::new(temp.path());
        work_dir.initialize().unwrap();

        for dir in [
            work_dir.instances_dir(),
            work_dir.archive_dir(),
            work_dir.signals_dir(),
            work_dir.templates_dir(),
            work_dir.locks_dir(),
        ] {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
        assert!(work_dir.root().join("README.md").exists());
        assert_eq!(work_dir.project_root(), Some(temp.path()));

        let err = work_dir.initialize().unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_load_requires_init_and_repairs_missing_dirs() {
        let temp = TempDir::new().unwrap();
        let work_dir = WorkDir::new(temp.path());
        assert!(work_dir.load().is_err());

        work_dir.initialize().unwrap();
        fs::remove_dir(work_dir.signals_dir()).unwrap();
        work_dir.load().unwrap();
        assert!(work_dir.signals_dir().is_dir());
    }
}
