//! Queue persistence, the resolved-target set and shared in-process access

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::fs::locking::with_exclusive_lock;
use crate::models::Candidate;

use super::blockers::ResolutionTracker;
use super::queue::{ClaimReport, MutationReport, Queue, QueueOp};

/// Queue persisted as TOML, shared between processes.
///
/// Every read-modify-write runs under an exclusive lock, so two processes
/// claiming at once never receive the same candidate.
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> EngineResult<Option<Queue>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).map_err(|e| EngineError::io(&self.path, e))?;
        parse_queue(&content).map(Some)
    }

    pub fn save(&self, queue: &Queue) -> EngineResult<()> {
        let content = render_queue(queue)?;
        with_exclusive_lock(&self.path, |_| Ok((Some(content), ())))?;
        tracing::debug!(path = %self.path.display(), entries = queue.len(), "saved queue");
        Ok(())
    }

    /// Atomically pop the top actionable entry.
    pub fn claim(
        &self,
        resolved: &dyn ResolutionTracker,
        now: DateTime<Utc>,
    ) -> EngineResult<ClaimReport> {
        self.update(|queue| queue.claim(resolved, now))
    }

    /// Atomically pop the top actionable entry if `accept` agrees to it. A
    /// refused entry stays queued and nothing is written.
    pub fn claim_checked(
        &self,
        resolved: &dyn ResolutionTracker,
        now: DateTime<Utc>,
        accept: impl FnOnce(&Candidate) -> EngineResult<()>,
    ) -> EngineResult<ClaimReport> {
        self.update(|queue| queue.claim_checked(resolved, now, accept))
    }

    /// Apply a mutation under the queue lock.
    pub fn mutate(
        &self,
        op: QueueOp,
        resolved: &dyn ResolutionTracker,
    ) -> EngineResult<MutationReport> {
        self.update(|queue| queue.mutate(op, resolved))
    }

    fn update<T>(&self, apply: impl FnOnce(&mut Queue) -> EngineResult<T>) -> EngineResult<T> {
        with_exclusive_lock(&self.path, |current| {
            if current.trim().is_empty() {
                return Err(EngineError::NotFound(format!(
                    "no queue at {} (run `phasegate queue build`)",
                    self.path.display()
                )));
            }
            let mut queue = parse_queue(current)?;
            let value = apply(&mut queue)?;
            Ok((Some(render_queue(&queue)?), value))
        })
    }
}

fn parse_queue(content: &str) -> EngineResult<Queue> {
    toml::from_str(content).map_err(|e| EngineError::serialization("queue", e))
}

fn render_queue(queue: &Queue) -> EngineResult<String> {
    toml::to_string_pretty(queue).map_err(|e| EngineError::serialization("queue", e))
}

/// In-process queue handle with an atomic claim.
#[derive(Debug, Clone)]
pub struct SharedQueue {
    inner: Arc<Mutex<Queue>>,
}

impl SharedQueue {
    pub fn new(queue: Queue) -> Self {
        Self {
            inner: Arc::new(Mutex::new(queue)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        // claim and mutate only commit whole changes
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn claim(
        &self,
        resolved: &dyn ResolutionTracker,
        now: DateTime<Utc>,
    ) -> EngineResult<ClaimReport> {
        self.lock().claim(resolved, now)
    }

    pub fn mutate(
        &self,
        op: QueueOp,
        resolved: &dyn ResolutionTracker,
    ) -> EngineResult<MutationReport> {
        self.lock().mutate(op, resolved)
    }

    pub fn snapshot(&self) -> Queue {
        self.lock().clone()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ResolvedDocument {
    #[serde(default)]
    resolved: BTreeSet<String>,
}

/// Externally tracked set of resolved targets, stored as TOML.
#[derive(Debug, Clone)]
pub struct ResolvedSet {
    path: PathBuf,
}

impl ResolvedSet {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> EngineResult<BTreeSet<String>> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| EngineError::io(&self.path, e))?;
        let doc: ResolvedDocument =
            toml::from_str(&content).map_err(|e| EngineError::serialization("resolved set", e))?;
        Ok(doc.resolved)
    }

    /// Mark ids resolved. Returns the ids that were not resolved before.
    pub fn add(&self, ids: &[String]) -> EngineResult<Vec<String>> {
        self.edit(|set| ids.iter().filter(|id| set.insert((*id).clone())).cloned().collect())
    }

    /// Mark ids unresolved again. Returns the ids that were removed.
    pub fn remove(&self, ids: &[String]) -> EngineResult<Vec<String>> {
        self.edit(|set| ids.iter().filter(|id| set.remove(*id)).cloned().collect())
    }

    fn edit(&self, apply: impl FnOnce(&mut BTreeSet<String>) -> Vec<String>) -> EngineResult<Vec<String>> {
        with_exclusive_lock(&self.path, |current| {
            let mut doc: ResolvedDocument = if current.trim().is_empty() {
                ResolvedDocument::default()
            } else {
                toml::from_str(current).map_err(|e| EngineError::serialization("resolved set", e))?
            };
            let changed = apply(&mut doc.resolved);
            if changed.is_empty() {
                return Ok((None, changed));
            }
            let content = toml::to_string_pretty(&doc)
                .map_err(|e| EngineError::serialization("resolved set", e))?;
            Ok((Some(content), changed))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CandidateFile {
    List(Vec<Candidate>),
    Wrapped { candidates: Vec<Candidate> },
}

/// Read candidates from YAML: either a bare list or a `candidates:` key.
pub fn load_candidates(path: &Path) -> EngineResult<Vec<Candidate>> {
    let content = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
    parse_candidates(&content)
}

pub fn parse_candidates(content: &str) -> EngineResult<Vec<Candidate>> {
    let file: CandidateFile =
        serde_yaml::from_str(content).map_err(|e| EngineError::serialization("candidates", e))?;
    Ok(match file {
        CandidateFile::List(list) => list,
        CandidateFile::Wrapped { candidates } => candidates,
    })
}
