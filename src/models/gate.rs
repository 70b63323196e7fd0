use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Approval checkpoint that closes a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    pub id: String,
    pub kind: GateKind,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub status: GateStatus,
    /// Feedback from the most recent changes request.
    #[serde(default)]
    pub feedback: Option<String>,
    /// Reason recorded when the gate was skipped.
    #[serde(default)]
    pub waived: Option<String>,
    /// Workflow activity counter at the last changes request.
    #[serde(default)]
    pub changes_requested_at: Option<u64>,
    /// Workflow activity counter when the gate was rejected.
    #[serde(default)]
    pub rejected_at: Option<u64>,
    #[serde(default)]
    pub decided_at: Option<DateTime<Utc>>,
}

fn default_required() -> bool {
    true
}

fn default_override_allowed() -> bool {
    true
}

/// How a gate decides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GateKind {
    /// A person approves or requests changes.
    Human,
    /// Every named signal must be reported true.
    Auto { signals: Vec<String> },
    /// Signals must pass; a logged human override may force the outcome.
    Conditional {
        signals: Vec<String>,
        #[serde(default = "default_override_allowed")]
        override_allowed: bool,
    },
}

impl GateKind {
    pub fn signals(&self) -> &[String] {
        match self {
            GateKind::Human => &[],
            GateKind::Auto { signals } | GateKind::Conditional { signals, .. } => signals,
        }
    }

    pub fn approval_type(&self) -> ApprovalType {
        match self {
            GateKind::Human => ApprovalType::Human,
            GateKind::Auto { .. } => ApprovalType::Auto,
            GateKind::Conditional { .. } => ApprovalType::Conditional,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalType {
    Human,
    Auto,
    Conditional,
}

impl std::fmt::Display for ApprovalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalType::Human => write!(f, "human"),
            ApprovalType::Auto => write!(f, "auto"),
            ApprovalType::Conditional => write!(f, "conditional"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    #[default]
    Pending,
    Passed,
    Rejected,
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateStatus::Pending => write!(f, "pending"),
            GateStatus::Passed => write!(f, "passed"),
            GateStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Decision submitted by a human reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HumanDecision {
    Approve,
    Changes,
}

impl Gate {
    pub fn new(id: impl Into<String>, kind: GateKind, required: bool) -> Self {
        Self {
            id: id.into(),
            kind,
            required,
            status: GateStatus::Pending,
            feedback: None,
            waived: None,
            changes_requested_at: None,
            rejected_at: None,
            decided_at: None,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == GateStatus::Passed
    }

    /// Put the gate back to its initial pending state, keeping feedback.
    pub fn reset(&mut self) {
        self.status = GateStatus::Pending;
        self.waived = None;
        self.rejected_at = None;
        self.decided_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_kind_yaml_shape() {
        let gate = Gate::new(
            "ci",
            GateKind::Auto {
                signals: vec!["build".into(), "test".into()],
            },
            true,
        );
        let yaml = serde_yaml::to_string(&gate).unwrap();
        assert!(yaml.contains("type: auto"));

        let back: Gate = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, gate);
    }

    #[test]
    fn test_conditional_defaults_override_allowed() {
        let yaml = "id: review\nkind:\n  type: conditional\n  signals: [lint]\n";
        let gate: Gate = serde_yaml::from_str(yaml).unwrap();
        assert!(gate.required);
        assert_eq!(gate.status, GateStatus::Pending);
        assert_eq!(
            gate.kind,
            GateKind::Conditional {
                signals: vec!["lint".into()],
                override_allowed: true
            }
        );
        assert_eq!(gate.kind.approval_type(), ApprovalType::Conditional);
    }
}
