use serde::{Deserialize, Serialize};

use super::gate::Gate;
use super::unit::WorkUnit;

/// A named workflow stage holding ordered work units and an optional gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub status: PhaseStatus,
    #[serde(default)]
    pub units: Vec<WorkUnit>,
    #[serde(default)]
    pub gate: Option<Gate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Active,
    Complete,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseStatus::Pending => write!(f, "pending"),
            PhaseStatus::Active => write!(f, "active"),
            PhaseStatus::Complete => write!(f, "complete"),
        }
    }
}

/// Non-linear jump permitted without an override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEdge {
    pub from: String,
    pub to: String,
}

impl Phase {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn unit(&self, unit_id: &str) -> Option<&WorkUnit> {
        self.units.iter().find(|u| u.id == unit_id)
    }

    pub fn unit_mut(&mut self, unit_id: &str) -> Option<&mut WorkUnit> {
        self.units.iter_mut().find(|u| u.id == unit_id)
    }

    /// Every required unit is complete, skipped or failed.
    pub fn required_units_terminal(&self) -> bool {
        self.units
            .iter()
            .filter(|u| u.is_required())
            .all(|u| u.status.is_terminal())
    }

    /// Every required unit is complete or skipped.
    pub fn required_units_satisfied(&self) -> bool {
        self.units
            .iter()
            .filter(|u| u.is_required())
            .all(|u| u.status.is_satisfied())
    }

    /// Required units that still hold the phase open, with their status.
    pub fn outstanding_units(&self) -> Vec<String> {
        self.units
            .iter()
            .filter(|u| u.is_required() && !u.status.is_satisfied())
            .map(|u| format!("{} ({})", u.id, u.status))
            .collect()
    }

    /// First unit that still needs an executor run, in declaration order.
    pub fn next_open_unit(&self) -> Option<&WorkUnit> {
        self.units.iter().find(|u| !u.status.is_terminal())
    }
}
