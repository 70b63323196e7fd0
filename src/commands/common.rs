//! Work directory discovery and engine wiring shared by the commands.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fs::config::Config;
use crate::fs::work_dir::{WorkDir, WORK_DIR_NAME};
use crate::planning::{QueueStore, ResolvedSet};
use crate::template::TemplateRegistry;
use crate::workflow::{
    CommandSignals, CompositeSignals, Engine, FsArchive, FsStateStore, RecordedSignals,
    ShellExecutor,
};

/// Find the directory holding `.phasegate/` by walking up from the current
/// directory, so commands work from any subdirectory of a project.
pub fn find_project_root() -> Result<PathBuf> {
    let mut current = std::env::current_dir().context("Failed to get current directory")?;

    loop {
        if current.join(WORK_DIR_NAME).is_dir() {
            return Ok(current);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => bail!("Could not find {WORK_DIR_NAME} directory. Run 'phasegate init' first."),
        }
    }
}

/// An opened work directory with its validated configuration.
pub struct Workspace {
    pub work_dir: WorkDir,
    pub config: Config,
}

impl Workspace {
    pub fn open() -> Result<Self> {
        Self::open_at(&find_project_root()?)
    }

    pub fn open_at(project_root: &Path) -> Result<Self> {
        let work_dir = WorkDir::new(project_root);
        work_dir.load()?;
        let config = Config::load(&work_dir.config_path()).with_context(|| {
            format!("Failed to load {}", work_dir.config_path().display())
        })?;
        Ok(Self { work_dir, config })
    }

    fn project_root(&self) -> PathBuf {
        self.work_dir
            .project_root()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Built-in templates overlaid with `.phasegate/templates/`.
    pub fn templates(&self) -> Result<TemplateRegistry> {
        let mut registry = TemplateRegistry::builtin().context("Built-in templates are invalid")?;
        let dir = self.work_dir.templates_dir();
        let loaded = registry
            .load_dir(&dir)
            .with_context(|| format!("Failed to load templates from {}", dir.display()))?;
        tracing::debug!(loaded, dir = %dir.display(), "loaded user templates");
        Ok(registry)
    }

    pub fn recorded_signals(&self) -> RecordedSignals {
        RecordedSignals::new(self.work_dir.signals_dir())
    }

    pub fn archive(&self) -> FsArchive {
        FsArchive::new(self.work_dir.archive_dir())
    }

    pub fn queue_store(&self) -> QueueStore {
        QueueStore::new(self.work_dir.queue_path())
    }

    pub fn resolved_set(&self) -> ResolvedSet {
        ResolvedSet::new(self.work_dir.resolved_path())
    }

    /// Engine wired to the file store, archive, configured executor and
    /// signal sources. Recorded signals win over signal commands.
    pub fn engine(&self) -> Result<Engine> {
        let root = self.project_root();
        let store = FsStateStore::new(self.work_dir.instances_dir(), self.work_dir.locks_dir());

        let signals = CompositeSignals::new()
            .with(self.recorded_signals())
            .with(
                CommandSignals::new(
                    self.config.signals.commands.clone(),
                    Duration::from_secs(self.config.signals.timeout_secs),
                )
                .with_working_dir(&root),
            );

        let mut engine = Engine::new(store, self.templates()?)
            .with_policy(self.config.gates)
            .with_archive(self.archive())
            .with_signals(signals);

        if let Some(command) = &self.config.executor.command {
            engine = engine.with_executor(
                ShellExecutor::new(
                    command.clone(),
                    Duration::from_secs(self.config.executor.timeout_secs),
                )
                .with_working_dir(root),
            );
        }

        Ok(engine)
    }
}

/// Truncate to `max_len` characters, marking the cut with an ellipsis.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!(
            "{}…",
            s.chars().take(max_len.saturating_sub(1)).collect::<String>()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn test_open_at_requires_init() {
        let temp = TempDir::new().unwrap();
        assert!(Workspace::open_at(temp.path()).is_err());

        WorkDir::new(temp.path()).initialize().unwrap();
        let workspace = Workspace::open_at(temp.path()).unwrap();
        assert_eq!(workspace.config, Config::default());
        assert!(workspace.engine().is_ok());
    }
}
