//! Gate evaluation
//!
//! Every function here returns a new [`Gate`] and never touches the input;
//! the engine decides whether to commit the result.

use chrono::Utc;

use crate::error::{EngineError, EngineResult};
use crate::fs::config::GatePolicy;
use crate::models::{Gate, GateKind, GateStatus, HumanDecision, Phase};

use super::signals::SignalMap;

/// Automatic predicate: every named signal present and true.
///
/// Pure and idempotent. Human gates have no automatic predicate and stay
/// pending.
pub fn evaluate_auto(gate: &Gate, signals: &SignalMap) -> GateStatus {
    match &gate.kind {
        GateKind::Human => GateStatus::Pending,
        GateKind::Auto { signals: names } | GateKind::Conditional { signals: names, .. } => {
            if names.iter().all(|n| signals.get(n).copied().unwrap_or(false)) {
                GateStatus::Passed
            } else {
                GateStatus::Pending
            }
        }
    }
}

/// Signals a gate names that are missing or false.
pub fn unmet_signals(gate: &Gate, signals: &SignalMap) -> Vec<String> {
    gate.kind
        .signals()
        .iter()
        .filter(|n| !signals.get(*n).copied().unwrap_or(false))
        .cloned()
        .collect()
}

/// Decides gate outcomes for the active phase under a [`GatePolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GateEvaluator {
    policy: GatePolicy,
}

fn gate_of(phase: &Phase) -> EngineResult<&Gate> {
    phase.gate.as_ref().ok_or_else(|| {
        EngineError::InvalidTransition(format!("phase '{}' has no gate", phase.id))
    })
}

fn ensure_units_satisfied(phase: &Phase) -> EngineResult<()> {
    if phase.required_units_satisfied() {
        return Ok(());
    }
    Err(EngineError::GateNotSatisfied {
        phase: phase.id.clone(),
        reason: format!(
            "required units not complete or skipped: {}",
            phase.outstanding_units().join(", ")
        ),
    })
}

impl GateEvaluator {
    pub fn new(policy: GatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    /// Apply `approve` or `changes` to a human gate.
    ///
    /// `approve` requires every required unit complete or skipped. After a
    /// changes request, `approve` also requires new unit activity unless the
    /// policy allows re-approval without rework. `changes` leaves the gate
    /// pending with the feedback stored.
    pub fn submit_human_decision(
        &self,
        phase: &Phase,
        activity: u64,
        decision: HumanDecision,
        feedback: Option<String>,
    ) -> EngineResult<Gate> {
        let gate = gate_of(phase)?;
        if gate.kind != GateKind::Human {
            return Err(EngineError::InvalidTransition(format!(
                "gate '{}' is {} and does not take human decisions{}",
                gate.id,
                gate.kind.approval_type(),
                if matches!(gate.kind, GateKind::Conditional { .. }) {
                    " (use force-pass or force-reject)"
                } else {
                    ""
                }
            )));
        }
        let mut next = gate.clone();
        match decision {
            HumanDecision::Approve => {
                if gate.is_passed() {
                    return Err(EngineError::InvalidTransition(format!(
                        "gate '{}' has already passed",
                        gate.id
                    )));
                }
                ensure_units_satisfied(phase)?;
                if let Some(requested_at) = gate.changes_requested_at {
                    if activity <= requested_at && !self.policy.allow_reapproval_without_rework {
                        return Err(EngineError::GateNotSatisfied {
                            phase: phase.id.clone(),
                            reason: format!(
                                "changes were requested on gate '{}' and no unit activity followed; \
                                 add or rerun units before approving",
                                gate.id
                            ),
                        });
                    }
                }
                next.status = GateStatus::Passed;
            }
            HumanDecision::Changes => {
                let feedback = feedback
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .ok_or_else(|| {
                        EngineError::InvalidTransition(
                            "request-changes requires feedback".to_string(),
                        )
                    })?;
                // Reopens a passed gate while its phase is still active.
                next.status = GateStatus::Pending;
                next.feedback = Some(feedback);
                next.waived = None;
                next.changes_requested_at = Some(activity);
            }
        }
        next.decided_at = Some(Utc::now());
        Ok(next)
    }

    /// Re-evaluate an auto or conditional gate against fresh signals.
    ///
    /// A rejected gate stays rejected until unit activity moved past the
    /// rejection. A gate whose required units are not satisfied stays
    /// pending whatever the signals say.
    pub fn refresh(&self, phase: &Phase, activity: u64, signals: &SignalMap) -> EngineResult<Gate> {
        let gate = gate_of(phase)?;
        let mut next = gate.clone();

        match gate.status {
            GateStatus::Passed => return Ok(next),
            GateStatus::Rejected => {
                if gate.rejected_at.is_some_and(|at| activity <= at) {
                    return Ok(next);
                }
                next.reset();
            }
            GateStatus::Pending => {}
        }

        if matches!(gate.kind, GateKind::Human) || !phase.required_units_satisfied() {
            return Ok(next);
        }

        if evaluate_auto(&next, signals) == GateStatus::Passed {
            next.status = GateStatus::Passed;
            next.decided_at = Some(Utc::now());
        }
        Ok(next)
    }

    /// Logged human override of a conditional gate.
    pub fn force(&self, phase: &Phase, activity: u64, pass: bool, reason: &str) -> EngineResult<Gate> {
        let gate = gate_of(phase)?;
        match gate.kind {
            GateKind::Conditional {
                override_allowed: true,
                ..
            } => {}
            GateKind::Conditional { .. } => {
                return Err(EngineError::InvalidTransition(format!(
                    "gate '{}' does not allow overrides",
                    gate.id
                )))
            }
            _ => {
                return Err(EngineError::InvalidTransition(format!(
                    "only conditional gates can be forced; '{}' is {}",
                    gate.id,
                    gate.kind.approval_type()
                )))
            }
        }
        if reason.trim().is_empty() {
            return Err(EngineError::InvalidTransition(
                "forcing a gate requires a reason".to_string(),
            ));
        }

        let mut next = gate.clone();
        if pass {
            ensure_units_satisfied(phase)?;
            next.status = GateStatus::Passed;
            next.rejected_at = None;
        } else {
            next.status = GateStatus::Rejected;
            next.rejected_at = Some(activity);
        }
        next.feedback = Some(reason.trim().to_string());
        next.decided_at = Some(Utc::now());
        Ok(next)
    }

    /// Waive a gate's approval condition.
    ///
    /// Optional gates can be skipped freely; required ones only with an
    /// override. Required units still have to be complete or skipped.
    pub fn skip(&self, phase: &Phase, reason: &str, override_required: bool) -> EngineResult<Gate> {
        let gate = gate_of(phase)?;
        if gate.required && !override_required {
            return Err(EngineError::GateNotSkippable(gate.id.clone()));
        }
        if reason.trim().is_empty() {
            return Err(EngineError::InvalidTransition(
                "skipping a gate requires a reason".to_string(),
            ));
        }
        ensure_units_satisfied(phase)?;

        let mut next = gate.clone();
        next.status = GateStatus::Passed;
        next.waived = Some(reason.trim().to_string());
        next.decided_at = Some(Utc::now());
        Ok(next)
    }
}
