//! Archival of completed workflows

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{EngineError, EngineResult};
use crate::fs::locking::atomic_write;
use crate::models::ExecutionState;

use super::store::render_state;

const STATE_FILE: &str = "state.md";
const MANIFEST_FILE: &str = "manifest.toml";

/// Where a completed state ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveRecord {
    pub instance: String,
    pub location: PathBuf,
    pub sha256: String,
}

/// Receives terminal states. The live document is deleted only after
/// `archive` returns `Ok`.
pub trait ArchiveSink {
    fn archive(&self, state: &ExecutionState) -> EngineResult<ArchiveRecord>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverableEntry {
    pub phase: String,
    pub unit: String,
    #[serde(default)]
    pub produced: Vec<String>,
}

/// `manifest.toml` of an archive snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub instance: String,
    pub loop_id: String,
    pub template_version: String,
    pub mode: String,
    pub completed_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
    /// SHA-256 of `state.md`, hex encoded.
    pub state_sha256: String,
    #[serde(default)]
    pub deliverables: Vec<DeliverableEntry>,
}

/// Snapshots under `.phasegate/archive/<completed>-<instance>/`.
///
/// `state.md` is written first and `manifest.toml` last; a snapshot without
/// a manifest is incomplete and is never listed.
#[derive(Debug, Clone)]
pub struct FsArchive {
    dir: PathBuf,
}

pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

impl FsArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn snapshot_dir(&self, state: &ExecutionState, completed_at: DateTime<Utc>) -> PathBuf {
        self.dir.join(format!(
            "{}-{}",
            completed_at.format("%Y%m%dT%H%M%SZ"),
            state.id
        ))
    }

    /// Complete snapshots, oldest first.
    pub fn list(&self) -> EngineResult<Vec<(PathBuf, ArchiveManifest)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| EngineError::io(&self.dir, e))? {
            let path = entry.map_err(|e| EngineError::io(&self.dir, e))?.path();
            let manifest_path = path.join(MANIFEST_FILE);
            if !manifest_path.is_file() {
                continue;
            }
            found.push((path, read_manifest(&manifest_path)?));
        }
        found.sort_by(|a, b| {
            a.1.completed_at
                .cmp(&b.1.completed_at)
                .then_with(|| a.1.instance.cmp(&b.1.instance))
        });
        Ok(found)
    }

    /// Recompute the state digest of a snapshot and compare it with the manifest.
    pub fn verify(&self, snapshot: &Path) -> EngineResult<bool> {
        let manifest = read_manifest(&snapshot.join(MANIFEST_FILE))?;
        let state_path = snapshot.join(STATE_FILE);
        let content = fs::read_to_string(&state_path).map_err(|e| EngineError::io(&state_path, e))?;
        Ok(sha256_hex(&content) == manifest.state_sha256)
    }
}

fn read_manifest(path: &Path) -> EngineResult<ArchiveManifest> {
    let content = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
    toml::from_str(&content).map_err(|e| EngineError::serialization("archive manifest", e))
}

impl ArchiveSink for FsArchive {
    fn archive(&self, state: &ExecutionState) -> EngineResult<ArchiveRecord> {
        if !state.is_terminal() {
            return Err(EngineError::Archive(format!(
                "instance '{}' is not complete",
                state.id
            )));
        }
        let completed_at = state.completed_at.unwrap_or(state.updated_at);
        let location = self.snapshot_dir(state, completed_at);
        let document = render_state(state)?;
        let digest = sha256_hex(&document);

        // a complete snapshot with the same digest is reused
        let manifest_path = location.join(MANIFEST_FILE);
        if manifest_path.exists() {
            let existing = read_manifest(&manifest_path)?;
            if existing.state_sha256 != digest {
                return Err(EngineError::Archive(format!(
                    "snapshot {} already exists with different content",
                    location.display()
                )));
            }
            tracing::info!(instance = %state.id, location = %location.display(), "snapshot already archived");
            return Ok(ArchiveRecord {
                instance: state.id.clone(),
                location,
                sha256: digest,
            });
        }

        let manifest = ArchiveManifest {
            instance: state.id.clone(),
            loop_id: state.loop_id.clone(),
            template_version: state.template_version.clone(),
            mode: state.mode.clone(),
            completed_at,
            archived_at: Utc::now(),
            state_sha256: digest.clone(),
            deliverables: state
                .deliverable_manifest()
                .into_iter()
                .map(|(phase, unit, produced)| DeliverableEntry {
                    phase,
                    unit,
                    produced,
                })
                .collect(),
        };
        let manifest_toml = toml::to_string_pretty(&manifest)
            .map_err(|e| EngineError::serialization("archive manifest", e))?;

        atomic_write(&location.join(STATE_FILE), &document)?;
        atomic_write(&location.join(MANIFEST_FILE), &manifest_toml)?;

        tracing::info!(instance = %state.id, location = %location.display(), "archived instance");

        Ok(ArchiveRecord {
            instance: state.id.clone(),
            location,
            sha256: digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PhaseStatus, UnitStatus};
    use crate::template::TemplateRegistry;
    use tempfile::TempDir;

    fn completed_hotfix() -> ExecutionState {
        let mut state = TemplateRegistry::builtin()
            .unwrap()
            .instantiate("bugfix", Some("hotfix"))
            .unwrap();
        for phase in &mut state.phases {
            for unit in &mut phase.units {
                unit.status = UnitStatus::Complete;
                unit.produced = vec![format!("{}.out", unit.id)];
            }
            phase.status = PhaseStatus::Complete;
        }
        state.current_phase = None;
        state.completed_at = Some(Utc::now());
        state
    }

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_archive_writes_verifiable_snapshot() {
        let temp = TempDir::new().unwrap();
        let archive = FsArchive::new(temp.path());
        let state = completed_hotfix();

        let record = archive.archive(&state).unwrap();
        assert_eq!(record.instance, state.id);
        assert!(record.location.join(STATE_FILE).is_file());

        let listed = archive.list().unwrap();
        assert_eq!(listed.len(), 1);
        let (path, manifest) = &listed[0];
        assert_eq!(manifest.state_sha256, record.sha256);
        assert_eq!(manifest.mode, "hotfix");
        assert!(manifest
            .deliverables
            .iter()
            .any(|d| d.unit == "patch" && d.produced == vec!["patch.out".to_string()]));
        assert!(archive.verify(path).unwrap());

        // archiving the same completion again reuses the snapshot
        let again = archive.archive(&state).unwrap();
        assert_eq!(again.sha256, record.sha256);
        assert_eq!(again.location, record.location);
        assert_eq!(archive.list().unwrap().len(), 1);

        // a different state for the same completion never overwrites it
        let mut altered = state.clone();
        altered.mode = "standard".into();
        assert!(matches!(archive.archive(&altered), Err(EngineError::Archive(_))));
        assert!(archive.verify(path).unwrap());

        fs::write(path.join(STATE_FILE), "tampered").unwrap();
        assert!(!archive.verify(path).unwrap());
    }

    #[test]
    fn test_archive_rejects_live_state_and_skips_partial_snapshots() {
        let temp = TempDir::new().unwrap();
        let archive = FsArchive::new(temp.path());

        let live = TemplateRegistry::builtin()
            .unwrap()
            .instantiate("bugfix", None)
            .unwrap();
        assert!(matches!(archive.archive(&live), Err(EngineError::Archive(_))));

        // a state file without its manifest is an interrupted archive
        let partial = temp.path().join("20260101T000000Z-bugfix-partial");
        fs::create_dir_all(&partial).unwrap();
        fs::write(partial.join(STATE_FILE), "---\n---\n").unwrap();
        assert!(archive.list().unwrap().is_empty());
    }
}
