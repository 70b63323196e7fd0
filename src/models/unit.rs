use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// A single externally executed task inside a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub id: String,
    /// Deliverable names the unit is expected to produce.
    #[serde(default)]
    pub deliverables: Vec<String>,
    pub status: UnitStatus,
    /// Optional units do not hold back gates or phase advance.
    #[serde(default)]
    pub optional: bool,
    /// Skip or failure reason.
    #[serde(default)]
    pub reason: Option<String>,
    /// Deliverable names reported back by the executor.
    #[serde(default)]
    pub produced: Vec<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Status of a work unit.
///
/// State machine transitions:
/// - `Pending` → `Running` | `Complete` | `Skipped` | `Failed`
/// - `Running` → `Complete` | `Skipped` | `Failed` | `Pending` (interrupted run re-queued)
/// - `Complete`, `Skipped` and `Failed` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Pending,
    Running,
    Complete,
    Skipped,
    Failed,
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitStatus::Pending => write!(f, "pending"),
            UnitStatus::Running => write!(f, "running"),
            UnitStatus::Complete => write!(f, "complete"),
            UnitStatus::Skipped => write!(f, "skipped"),
            UnitStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for UnitStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(UnitStatus::Pending),
            "running" => Ok(UnitStatus::Running),
            "complete" | "completed" | "done" => Ok(UnitStatus::Complete),
            "skipped" => Ok(UnitStatus::Skipped),
            "failed" => Ok(UnitStatus::Failed),
            _ => Err(EngineError::InvalidTransition(format!(
                "unknown unit status '{s}' (use pending, running, complete, skipped, failed)"
            ))),
        }
    }
}

impl UnitStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UnitStatus::Complete | UnitStatus::Skipped | UnitStatus::Failed
        )
    }

    /// Complete or skipped: the statuses that let a gate pass.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, UnitStatus::Complete | UnitStatus::Skipped)
    }

    /// Check if transitioning from the current status to the new status is valid.
    ///
    /// Unlike stage statuses, a same-status transition is not a no-op for
    /// terminal units: once terminal, a unit never changes again.
    pub fn can_transition_to(&self, new_status: &UnitStatus) -> bool {
        match self {
            UnitStatus::Pending => !matches!(new_status, UnitStatus::Pending),
            UnitStatus::Running => !matches!(new_status, UnitStatus::Running),
            UnitStatus::Complete | UnitStatus::Skipped | UnitStatus::Failed => false,
        }
    }

    pub fn try_transition(&self, new_status: UnitStatus) -> EngineResult<UnitStatus> {
        if self.can_transition_to(&new_status) {
            Ok(new_status)
        } else {
            Err(EngineError::InvalidTransition(format!(
                "unit status {self} -> {new_status} is not allowed"
            )))
        }
    }

    pub fn valid_transitions(&self) -> Vec<UnitStatus> {
        match self {
            UnitStatus::Pending => vec![
                UnitStatus::Running,
                UnitStatus::Complete,
                UnitStatus::Skipped,
                UnitStatus::Failed,
            ],
            UnitStatus::Running => vec![
                UnitStatus::Pending,
                UnitStatus::Complete,
                UnitStatus::Skipped,
                UnitStatus::Failed,
            ],
            UnitStatus::Complete | UnitStatus::Skipped | UnitStatus::Failed => vec![],
        }
    }
}

impl WorkUnit {
    pub fn new(id: impl Into<String>, deliverables: Vec<String>) -> Self {
        Self {
            id: id.into(),
            deliverables,
            status: UnitStatus::Pending,
            optional: false,
            reason: None,
            produced: Vec::new(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_required(&self) -> bool {
        !self.optional
    }

    /// Apply a validated status change.
    ///
    /// `Skipped` requires a non-empty reason. The unit is left untouched when
    /// the transition is rejected.
    pub fn try_transition(&mut self, status: UnitStatus, reason: Option<String>) -> EngineResult<()> {
        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        if status == UnitStatus::Skipped && reason.is_none() {
            return Err(EngineError::InvalidTransition(format!(
                "skipping unit '{}' requires a reason",
                self.id
            )));
        }

        let next = self.status.try_transition(status).map_err(|_| {
            EngineError::InvalidTransition(format!(
                "unit '{}' cannot move from {} to {status}",
                self.id, self.status
            ))
        })?;

        let now = Utc::now();
        match next {
            UnitStatus::Running => self.started_at = Some(now),
            UnitStatus::Pending => self.started_at = None,
            _ => self.finished_at = Some(now),
        }
        if reason.is_some() || next.is_terminal() {
            self.reason = reason;
        }
        self.status = next;
        Ok(())
    }
}
