//! Phase graph transitions
//!
//! These functions mutate an `ExecutionState` in memory only. Each one
//! validates everything before its first write, so an `Err` leaves the state
//! untouched.

use chrono::Utc;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    ExecutionState, GateStatus, PhaseStatus, SuspendPoint, UnitStatus, WorkUnit,
};

/// Outcome of a phase advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advance {
    pub from: String,
    /// Newly active phase, `None` when the workflow reached its end.
    pub to: Option<String>,
}

/// How a jump was justified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    /// Back to the current phase or an earlier one.
    Backward,
    /// To the next phase right after a satisfied gate.
    Next,
    /// Along an edge declared by the template.
    Edge,
    /// Anything else, accepted because of an explicit override.
    Override,
}

impl std::fmt::Display for JumpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JumpKind::Backward => write!(f, "backward"),
            JumpKind::Next => write!(f, "next"),
            JumpKind::Edge => write!(f, "edge"),
            JumpKind::Override => write!(f, "override"),
        }
    }
}

/// Index of the active phase, or `WorkflowTerminal`.
pub fn ensure_active(state: &ExecutionState) -> EngineResult<usize> {
    state
        .active_index()
        .ok_or_else(|| EngineError::WorkflowTerminal(state.id.clone()))
}

/// Why the active phase may not be left yet, if anything.
pub fn advance_blocker(state: &ExecutionState) -> EngineResult<Option<String>> {
    let idx = ensure_active(state)?;
    let phase = &state.phases[idx];
    let reason = match &phase.gate {
        Some(gate) => match gate.status {
            GateStatus::Passed => None,
            GateStatus::Rejected => Some(format!(
                "gate '{}' was rejected{}",
                gate.id,
                gate.feedback
                    .as_deref()
                    .map(|f| format!(": {f}"))
                    .unwrap_or_default()
            )),
            GateStatus::Pending => Some(format!(
                "gate '{}' ({}) is pending",
                gate.id,
                gate.kind.approval_type()
            )),
        },
        None if phase.required_units_terminal() => None,
        None => Some(format!(
            "required units still open: {}",
            phase
                .units
                .iter()
                .filter(|u| u.is_required() && !u.status.is_terminal())
                .map(|u| format!("{} ({})", u.id, u.status))
                .collect::<Vec<_>>()
                .join(", ")
        )),
    };
    Ok(reason)
}

/// Complete the active phase and activate the next one, or finish the
/// workflow after the last phase.
pub fn advance_phase(state: &mut ExecutionState) -> EngineResult<Advance> {
    let idx = ensure_active(state)?;
    if let Some(reason) = advance_blocker(state)? {
        return Err(EngineError::GateNotSatisfied {
            phase: state.phases[idx].id.clone(),
            reason,
        });
    }

    let from = state.phases[idx].id.clone();
    state.phases[idx].status = PhaseStatus::Complete;

    let to = state.phases.get_mut(idx + 1).map(|next| {
        next.status = PhaseStatus::Active;
        next.id.clone()
    });

    state.current_phase = to.clone();
    if to.is_none() {
        state.completed_at = Some(Utc::now());
    }
    state.record_audit(
        "advance",
        match &to {
            Some(next) => format!("{from} -> {next}"),
            None => format!("{from} -> complete"),
        },
        false,
    );
    state.touch();

    Ok(Advance { from, to })
}

/// Record a unit status change in the active phase.
///
/// `produced` deliverable names are appended to what the unit already
/// reported. Counts as unit activity.
pub fn record_unit_status(
    state: &mut ExecutionState,
    unit_id: &str,
    status: UnitStatus,
    reason: Option<String>,
    produced: Vec<String>,
) -> EngineResult<()> {
    let idx = ensure_active(state)?;
    let phase = &mut state.phases[idx];
    let phase_id = phase.id.clone();
    let unit = phase
        .unit_mut(unit_id)
        .ok_or_else(|| EngineError::UnknownUnit {
            unit: unit_id.to_string(),
            phase: phase_id.clone(),
        })?;

    let from = unit.status;
    unit.try_transition(status, reason.clone())?;
    for name in produced {
        if !unit.produced.contains(&name) {
            unit.produced.push(name);
        }
    }

    state.activity += 1;
    let detail = match reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(r) => format!("{phase_id}/{unit_id}: {from} -> {status} ({r})"),
        None => format!("{phase_id}/{unit_id}: {from} -> {status}"),
    };
    state.record_audit("unit", detail, false);
    state.touch();
    Ok(())
}

/// Append a pending follow-up unit to the active phase.
///
/// New work invalidates an approval: a passed gate on the phase goes back to
/// pending.
pub fn add_follow_up_unit(
    state: &mut ExecutionState,
    unit_id: &str,
    deliverables: Vec<String>,
) -> EngineResult<()> {
    let idx = ensure_active(state)?;
    let phase = &mut state.phases[idx];
    if phase.unit(unit_id).is_some() {
        return Err(EngineError::InvalidTransition(format!(
            "unit '{unit_id}' already exists in phase '{}'",
            phase.id
        )));
    }

    phase.units.push(WorkUnit::new(unit_id, deliverables));
    if let Some(gate) = phase.gate.as_mut() {
        if gate.is_passed() {
            gate.reset();
        }
    }
    let phase_id = phase.id.clone();

    state.activity += 1;
    state.record_audit("add-unit", format!("{phase_id}/{unit_id}"), false);
    state.touch();
    Ok(())
}

/// Move the active pointer to `target`.
///
/// Without `override_rules` the jump must go back to the current or an
/// earlier phase, to the next phase once the current one may be left, or
/// follow a template edge. Jumping to the current phase or behind it resets
/// the gates of the target and every later phase; unit statuses are kept.
pub fn jump_to_phase(
    state: &mut ExecutionState,
    target: &str,
    override_rules: bool,
) -> EngineResult<JumpKind> {
    let current = ensure_active(state)?;
    let target_idx = state
        .phase_index(target)
        .ok_or_else(|| EngineError::UnknownPhase(target.to_string()))?;
    let current_id = state.phases[current].id.clone();
    let current_done = advance_blocker(state)?.is_none();

    let kind = if target_idx <= current {
        JumpKind::Backward
    } else if state.has_jump_edge(&current_id, target) {
        JumpKind::Edge
    } else if target_idx == current + 1 && current_done {
        JumpKind::Next
    } else if override_rules {
        JumpKind::Override
    } else {
        return Err(EngineError::InvalidTransition(format!(
            "cannot jump from '{current_id}' to '{target}': not an earlier phase, \
             not the next phase after a satisfied gate, and no template edge (use --override)"
        )));
    };

    if target_idx <= current {
        for phase in &mut state.phases[target_idx..] {
            phase.status = PhaseStatus::Pending;
            if let Some(gate) = phase.gate.as_mut() {
                gate.reset();
            }
        }
    } else {
        // Phases jumped over stay pending.
        state.phases[current].status = if current_done {
            PhaseStatus::Complete
        } else {
            PhaseStatus::Pending
        };
        if let Some(gate) = state.phases[target_idx].gate.as_mut() {
            gate.reset();
        }
    }
    state.phases[target_idx].status = PhaseStatus::Active;
    state.current_phase = Some(target.to_string());

    let overridden = kind == JumpKind::Override;
    state.record_audit("jump", format!("{current_id} -> {target} ({kind})"), overridden);
    state.touch();
    Ok(kind)
}

/// Record a suspend point. Phase, gate and unit statuses are untouched; a
/// running unit stays running and is re-executed on resume.
pub fn pause(state: &mut ExecutionState, note: Option<String>) -> EngineResult<()> {
    ensure_active(state)?;
    let unit = state
        .active_phase()
        .and_then(|p| p.units.iter().find(|u| u.status == UnitStatus::Running))
        .map(|u| u.id.clone());
    state.suspended = Some(SuspendPoint {
        at: Utc::now(),
        phase: state.current_phase.clone(),
        unit,
        note: note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
    });
    state.record_audit("pause", state.current_phase.clone().unwrap_or_default(), false);
    state.touch();
    Ok(())
}

/// Clear the suspend point. Returns whether the state was suspended.
pub fn resume(state: &mut ExecutionState) -> bool {
    match state.suspended.take() {
        Some(_) => {
            state.record_audit("resume", state.current_phase.clone().unwrap_or_default(), false);
            state.touch();
            true
        }
        None => false,
    }
}
