//! Execution state persistence
//!
//! One markdown document per instance: YAML frontmatter holds the state, the
//! body is a human-readable summary that is ignored on load.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::fs::locking::{atomic_write, locked_read, LockGuard};
use crate::models::{ExecutionState, STATE_SCHEMA_VERSION};
use crate::parser::frontmatter::{parse_from_markdown, render_markdown};

const STATE_TYPE: &str = "execution state";

/// Durable home of execution states.
pub trait StateStore {
    /// Persist `state` all-or-nothing and return the committed copy with its
    /// revision incremented. The input is never modified.
    fn save(&self, state: &ExecutionState) -> EngineResult<ExecutionState>;

    fn load(&self, id: &str) -> EngineResult<ExecutionState>;

    fn exists(&self, id: &str) -> bool;

    fn delete(&self, id: &str) -> EngineResult<()>;

    /// Every stored state, ordered by creation time.
    fn list(&self) -> EngineResult<Vec<ExecutionState>>;

    /// Exclusive per-instance lock serializing directives.
    fn lock(&self, id: &str) -> EngineResult<LockGuard>;
}

/// Markdown state documents under `.phasegate/instances/`.
#[derive(Debug, Clone)]
pub struct FsStateStore {
    dir: PathBuf,
    locks_dir: PathBuf,
}

impl FsStateStore {
    pub fn new(dir: impl Into<PathBuf>, locks_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks_dir: locks_dir.into(),
        }
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.md"))
    }
}

/// Render the persisted document for a state.
pub fn render_state(state: &ExecutionState) -> EngineResult<String> {
    render_markdown(state, STATE_TYPE, &summary_body(state))
}

/// Parse a persisted document, rejecting unknown schema versions.
pub fn parse_state(content: &str) -> EngineResult<ExecutionState> {
    let state: ExecutionState = parse_from_markdown(content, STATE_TYPE)?;
    if state.schema_version != STATE_SCHEMA_VERSION {
        return Err(EngineError::serialization(
            STATE_TYPE,
            format!(
                "unsupported schema version {} (expected {STATE_SCHEMA_VERSION})",
                state.schema_version
            ),
        ));
    }
    Ok(state)
}

fn summary_body(state: &ExecutionState) -> String {
    let mut body = format!(
        "# {} ({} v{}, mode {})\n\n",
        state.id, state.loop_id, state.template_version, state.mode
    );
    for phase in &state.phases {
        let gate = phase
            .gate
            .as_ref()
            .map(|g| format!(" | gate {} {}", g.id, g.status))
            .unwrap_or_default();
        body.push_str(&format!(
            "- {} [{}]{gate}\n",
            phase.display_name(),
            phase.status
        ));
        for unit in &phase.units {
            body.push_str(&format!("  - {} [{}]\n", unit.id, unit.status));
        }
    }
    body
}

fn ensure_safe_id(id: &str) -> EngineResult<()> {
    crate::validation::validate_id(id).map_err(|e| EngineError::NotFound(format!("{id}: {e}")))
}

impl StateStore for FsStateStore {
    fn save(&self, state: &ExecutionState) -> EngineResult<ExecutionState> {
        ensure_safe_id(&state.id)?;
        let mut committed = state.clone();
        committed.revision += 1;
        let content = render_state(&committed)?;
        let path = self.path_for(&committed.id);
        atomic_write(&path, &content)?;
        tracing::debug!(
            instance = %committed.id,
            revision = committed.revision,
            path = %path.display(),
            "saved execution state"
        );
        Ok(committed)
    }

    fn load(&self, id: &str) -> EngineResult<ExecutionState> {
        ensure_safe_id(id)?;
        let path = self.path_for(id);
        if !path.exists() {
            return Err(EngineError::NotFound(id.to_string()));
        }
        let content = locked_read(&path)?;
        parse_state(&content)
    }

    fn exists(&self, id: &str) -> bool {
        ensure_safe_id(id).is_ok() && self.path_for(id).exists()
    }

    fn delete(&self, id: &str) -> EngineResult<()> {
        ensure_safe_id(id)?;
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(instance = id, "deleted live state");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::NotFound(id.to_string()))
            }
            Err(e) => Err(EngineError::io(&path, e)),
        }
    }

    fn list(&self) -> EngineResult<Vec<ExecutionState>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut states = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| EngineError::io(&self.dir, e))? {
            let entry = entry.map_err(|e| EngineError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            match read_state_file(&path) {
                Ok(state) => states.push(state),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable state"),
            }
        }
        states.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(states)
    }

    fn lock(&self, id: &str) -> EngineResult<LockGuard> {
        ensure_safe_id(id)?;
        LockGuard::acquire(&self.locks_dir.join(format!("{id}.lock")))
    }
}

fn read_state_file(path: &Path) -> EngineResult<ExecutionState> {
    parse_state(&locked_read(path)?)
}
