//! Shared fixtures for integration tests

use std::fs;
use std::path::{Path, PathBuf};

use phasegate::commands::common::Workspace;
use phasegate::commands::init::initialize_at;
use tempfile::TempDir;

/// A project directory with an initialized `.phasegate/`.
pub fn init_project() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp dir");
    initialize_at(temp.path()).expect("Failed to initialize work dir");
    temp
}

/// Replace `.phasegate/config.toml`.
pub fn write_config(project: &Path, content: &str) {
    fs::write(project.join(".phasegate").join("config.toml"), content)
        .expect("Failed to write config");
}

pub fn open(project: &Path) -> Workspace {
    Workspace::open_at(project).expect("Failed to open workspace")
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("Failed to write file");
    path
}

/// Restores the working directory on drop.
pub struct CwdGuard {
    previous: PathBuf,
}

impl CwdGuard {
    pub fn enter(dir: &Path) -> Self {
        let previous = std::env::current_dir().expect("Failed to read cwd");
        std::env::set_current_dir(dir).expect("Failed to change cwd");
        Self { previous }
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.previous);
    }
}
