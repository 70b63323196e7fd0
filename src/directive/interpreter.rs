//! Applies directives to stored instances.

use std::fmt;

use crate::error::EngineResult;
use crate::models::{ExecutionState, HumanDecision, UnitStatus};
use crate::workflow::{Engine, Progress};

use super::parser::{guidance, Directive};

/// What a directive did, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Status,
    Help(String),
    Progress(Progress),
    GateApproved { gate: String },
    /// The phase stays open with the reviewer's feedback.
    ChangesRequested { gate: String, feedback: String },
    GateForced { gate: String, passed: bool },
    GateSkipped { gate: String, overridden: bool },
    UnitSkipped { unit: String },
    UnitAdded { unit: String },
    Jumped { phase: String, overridden: bool },
    Paused,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Status => write!(f, "status"),
            Outcome::Help(text) => write!(f, "{}", text.trim_end()),
            Outcome::Progress(progress) => match progress {
                Progress::RanUnit {
                    unit,
                    status,
                    reason,
                } => {
                    write!(f, "unit '{unit}' {status}")?;
                    if let Some(reason) = reason {
                        write!(f, ": {reason}")?;
                    }
                    Ok(())
                }
                Progress::NeedsExecutor { unit } => write!(
                    f,
                    "unit '{unit}' is open and no executor is configured; record its status with `phasegate unit`"
                ),
                Progress::Advanced { from, to: Some(to) } => write!(f, "advanced {from} -> {to}"),
                Progress::Advanced { from, to: None } => {
                    write!(f, "completed final phase '{from}'")
                }
                Progress::AwaitingApproval { gate } => {
                    write!(f, "gate '{gate}' awaits approve-gate or request-changes")
                }
                Progress::AwaitingSignals { gate, unmet } => {
                    write!(f, "gate '{gate}' waits on signals: {}", unmet.join(", "))
                }
                Progress::GateRejected { gate, feedback } => {
                    write!(f, "gate '{gate}' rejected")?;
                    if let Some(feedback) = feedback {
                        write!(f, ": {feedback}")?;
                    }
                    Ok(())
                }
                Progress::Blocked { reason } => write!(f, "blocked: {reason}"),
                Progress::Completed => write!(f, "workflow complete"),
            },
            Outcome::GateApproved { gate } => write!(f, "gate '{gate}' approved"),
            Outcome::ChangesRequested { gate, feedback } => {
                write!(f, "changes requested on gate '{gate}': {feedback}")
            }
            Outcome::GateForced { gate, passed } => write!(
                f,
                "gate '{gate}' forced to {}",
                if *passed { "pass" } else { "reject" }
            ),
            Outcome::GateSkipped { gate, overridden } => {
                write!(f, "gate '{gate}' skipped")?;
                if *overridden {
                    write!(f, " (override)")?;
                }
                Ok(())
            }
            Outcome::UnitSkipped { unit } => write!(f, "unit '{unit}' skipped"),
            Outcome::UnitAdded { unit } => write!(f, "unit '{unit}' added"),
            Outcome::Jumped { phase, overridden } => {
                write!(f, "jumped to '{phase}'")?;
                if *overridden {
                    write!(f, " (override)")?;
                }
                Ok(())
            }
            Outcome::Paused => write!(f, "paused"),
        }
    }
}

/// A directive's committed result.
#[derive(Debug, Clone)]
pub struct Applied {
    pub state: ExecutionState,
    pub outcome: Outcome,
}

/// Runs directives one at a time against one instance.
pub struct Interpreter<'a> {
    engine: &'a Engine,
}

impl<'a> Interpreter<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Parse and apply one directive line.
    pub fn apply_line(&self, instance: &str, line: &str) -> EngineResult<Applied> {
        let directive = Directive::parse(line)?;
        self.apply(instance, &directive)
    }

    /// Apply `directive` under the instance's exclusive lock.
    ///
    /// The state is reloaded after the lock is taken, so concurrent
    /// directives always see each other's commits.
    pub fn apply(&self, instance: &str, directive: &Directive) -> EngineResult<Applied> {
        if directive.is_read_only() {
            let state = self.engine.load(instance)?;
            return Ok(self.read_only(state, directive));
        }

        let _guard = self.engine.store().lock(instance)?;
        let state = self.engine.load(instance)?;
        tracing::debug!(instance, directive = %directive, revision = state.revision, "applying directive");
        self.apply_to(&state, directive)
    }

    fn read_only(&self, state: ExecutionState, directive: &Directive) -> Applied {
        let outcome = match directive {
            Directive::Help => Outcome::Help(guidance()),
            _ => Outcome::Status,
        };
        Applied { state, outcome }
    }

    fn apply_to(&self, state: &ExecutionState, directive: &Directive) -> EngineResult<Applied> {
        let engine = self.engine;
        let gate_id = || {
            state
                .active_phase()
                .and_then(|p| p.gate.as_ref())
                .map(|g| g.id.clone())
                .unwrap_or_default()
        };

        let (state, outcome) = match directive {
            Directive::Status | Directive::Help => {
                return Ok(self.read_only(state.clone(), directive));
            }
            Directive::Continue => {
                let (next, progress) = engine.continue_workflow(state)?;
                (next, Outcome::Progress(progress))
            }
            Directive::ApproveGate => (
                engine.submit_human_decision(state, HumanDecision::Approve, None)?,
                Outcome::GateApproved { gate: gate_id() },
            ),
            Directive::RequestChanges { feedback } => (
                engine.submit_human_decision(
                    state,
                    HumanDecision::Changes,
                    Some(feedback.clone()),
                )?,
                Outcome::ChangesRequested {
                    gate: gate_id(),
                    feedback: feedback.clone(),
                },
            ),
            Directive::Pause { note } => (engine.pause(state, note.clone())?, Outcome::Paused),
            Directive::SkipUnit { unit, reason } => (
                engine.record_unit_status(
                    state,
                    unit,
                    UnitStatus::Skipped,
                    Some(reason.clone()),
                    Vec::new(),
                )?,
                Outcome::UnitSkipped { unit: unit.clone() },
            ),
            Directive::SkipGate {
                reason,
                override_required,
            } => {
                let next = engine.skip_gate(state, reason, *override_required)?;
                let overridden = next.audit.last().is_some_and(|a| a.overridden);
                (
                    next,
                    Outcome::GateSkipped {
                        gate: gate_id(),
                        overridden,
                    },
                )
            }
            Directive::JumpPhase {
                phase,
                override_rules,
            } => {
                let next = engine.jump_to_phase(state, phase, *override_rules)?;
                let overridden = next.audit.last().is_some_and(|a| a.overridden);
                (
                    next,
                    Outcome::Jumped {
                        phase: phase.clone(),
                        overridden,
                    },
                )
            }
            Directive::AddUnit { unit, deliverables } => (
                engine.add_follow_up_unit(state, unit, deliverables.clone())?,
                Outcome::UnitAdded { unit: unit.clone() },
            ),
            Directive::ForcePass { reason } => (
                engine.force_gate(state, true, reason)?,
                Outcome::GateForced {
                    gate: gate_id(),
                    passed: true,
                },
            ),
            Directive::ForceReject { reason } => (
                engine.force_gate(state, false, reason)?,
                Outcome::GateForced {
                    gate: gate_id(),
                    passed: false,
                },
            ),
        };

        Ok(Applied { state, outcome })
    }
}
