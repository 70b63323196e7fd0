use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phase::{Phase, PhaseEdge, PhaseStatus};

/// Version of the persisted state document layout.
pub const STATE_SCHEMA_VERSION: u32 = 1;

/// Durable state of one workflow instance.
///
/// Every engine operation receives the state explicitly; there is no
/// process-wide "current workflow".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub schema_version: u32,
    pub id: String,
    /// Template (loop) identifier.
    pub loop_id: String,
    /// Semantic version of the template the instance was created from.
    pub template_version: String,
    pub mode: String,
    /// Active phase id; `None` once the workflow is terminal.
    pub current_phase: Option<String>,
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub jumps: Vec<PhaseEdge>,
    /// Incremented on every committed write.
    #[serde(default)]
    pub revision: u64,
    /// Incremented on every unit status change and follow-up unit.
    #[serde(default)]
    pub activity: u64,
    #[serde(default)]
    pub suspended: Option<SuspendPoint>,
    #[serde(default)]
    pub audit: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Resumable suspend point written by `pause`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspendPoint {
    pub at: DateTime<Utc>,
    pub phase: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Audit record for decisions and overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub action: String,
    pub detail: String,
    #[serde(default)]
    pub overridden: bool,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        self.current_phase.is_none()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.is_some()
    }

    pub fn phase_index(&self, phase_id: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.id == phase_id)
    }

    pub fn active_index(&self) -> Option<usize> {
        self.current_phase
            .as_deref()
            .and_then(|id| self.phase_index(id))
    }

    pub fn active_phase(&self) -> Option<&Phase> {
        self.active_index().map(|i| &self.phases[i])
    }

    pub fn phase(&self, phase_id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == phase_id)
    }

    /// Whether the template declares a direct edge between two phases.
    pub fn has_jump_edge(&self, from: &str, to: &str) -> bool {
        self.jumps.iter().any(|e| e.from == from && e.to == to)
    }

    pub fn record_audit(&mut self, action: &str, detail: impl Into<String>, overridden: bool) {
        self.audit.push(AuditEntry {
            at: Utc::now(),
            action: action.to_string(),
            detail: detail.into(),
            overridden,
        });
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Count of phases per status, in pending/active/complete order.
    pub fn progress(&self) -> (usize, usize, usize) {
        self.phases.iter().fold((0, 0, 0), |(p, a, c), phase| match phase.status {
            PhaseStatus::Pending => (p + 1, a, c),
            PhaseStatus::Active => (p, a + 1, c),
            PhaseStatus::Complete => (p, a, c + 1),
        })
    }

    /// Deliverables produced so far, keyed by unit, for the archive manifest.
    pub fn deliverable_manifest(&self) -> Vec<(String, String, Vec<String>)> {
        self.phases
            .iter()
            .flat_map(|phase| {
                phase
                    .units
                    .iter()
                    .map(move |unit| (phase.id.clone(), unit.id.clone(), unit.produced.clone()))
            })
            .collect()
    }
}
