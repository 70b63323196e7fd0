//! The workflow engine: graph transitions, gate decisions and persistence
//! wired together.
//!
//! Every operation works on a copy of the given state, commits the copy and
//! returns what was committed. On any error, including a failed write, the
//! caller's state is still the last committed one.

use crate::error::EngineResult;
use crate::fs::config::GatePolicy;
use crate::models::{ExecutionState, GateKind, GateStatus, HumanDecision, UnitStatus};
use crate::template::TemplateRegistry;

use super::archive::{ArchiveRecord, ArchiveSink};
use super::executor::{UnitContext, UnitExecutor};
use super::gates::{unmet_signals, GateEvaluator};
use super::graph::{self, ensure_active};
use super::signals::{SignalSource, StaticSignals};
use super::store::StateStore;

/// What a `continue` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    RanUnit {
        unit: String,
        status: UnitStatus,
        reason: Option<String>,
    },
    /// A unit is open but no executor is configured.
    NeedsExecutor { unit: String },
    Advanced { from: String, to: Option<String> },
    AwaitingApproval { gate: String },
    AwaitingSignals { gate: String, unmet: Vec<String> },
    GateRejected { gate: String, feedback: Option<String> },
    /// Required units failed or are missing; the gate cannot pass.
    Blocked { reason: String },
    Completed,
}

pub struct Engine {
    store: Box<dyn StateStore>,
    templates: TemplateRegistry,
    gates: GateEvaluator,
    archive: Option<Box<dyn ArchiveSink>>,
    executor: Option<Box<dyn UnitExecutor>>,
    signals: Box<dyn SignalSource>,
}

impl Engine {
    pub fn new(store: impl StateStore + 'static, templates: TemplateRegistry) -> Self {
        Self {
            store: Box::new(store),
            templates,
            gates: GateEvaluator::default(),
            archive: None,
            executor: None,
            signals: Box::new(StaticSignals::default()),
        }
    }

    pub fn with_policy(mut self, policy: GatePolicy) -> Self {
        self.gates = GateEvaluator::new(policy);
        self
    }

    pub fn with_archive(mut self, archive: impl ArchiveSink + 'static) -> Self {
        self.archive = Some(Box::new(archive));
        self
    }

    pub fn with_executor(mut self, executor: impl UnitExecutor + 'static) -> Self {
        self.executor = Some(Box::new(executor));
        self
    }

    pub fn with_signals(mut self, signals: impl SignalSource + 'static) -> Self {
        self.signals = Box::new(signals);
        self
    }

    pub fn store(&self) -> &dyn StateStore {
        self.store.as_ref()
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Create and persist a new instance of `template` in `mode`.
    pub fn initialize(&self, template: &str, mode: Option<&str>) -> EngineResult<ExecutionState> {
        let state = self.templates.instantiate(template, mode)?;
        let committed = self.store.save(&state)?;
        tracing::info!(
            instance = %committed.id,
            template,
            mode = %committed.mode,
            phase = committed.current_phase.as_deref().unwrap_or("-"),
            "initialized workflow"
        );
        Ok(committed)
    }

    pub fn load(&self, id: &str) -> EngineResult<ExecutionState> {
        self.store.load(id)
    }

    fn apply<T>(
        &self,
        state: &ExecutionState,
        change: impl FnOnce(&mut ExecutionState) -> EngineResult<T>,
    ) -> EngineResult<(ExecutionState, T)> {
        let mut next = state.clone();
        let value = change(&mut next)?;
        let committed = self.commit(&next)?;
        Ok((committed, value))
    }

    fn commit(&self, next: &ExecutionState) -> EngineResult<ExecutionState> {
        let committed = self.store.save(next)?;
        if committed.is_terminal() {
            self.finish(&committed)?;
        }
        Ok(committed)
    }

    /// Archive a terminal state and drop its live document.
    ///
    /// Without an archive sink the completed state stays in the store.
    pub fn finish(&self, state: &ExecutionState) -> EngineResult<Option<ArchiveRecord>> {
        let Some(archive) = &self.archive else {
            return Ok(None);
        };
        let record = archive.archive(state)?;
        self.store.delete(&state.id)?;
        Ok(Some(record))
    }

    pub fn advance_phase(&self, state: &ExecutionState) -> EngineResult<ExecutionState> {
        let (next, advance) = self.apply(state, graph::advance_phase)?;
        tracing::info!(
            instance = %next.id,
            from = %advance.from,
            to = advance.to.as_deref().unwrap_or("complete"),
            "advanced phase"
        );
        Ok(next)
    }

    pub fn record_unit_status(
        &self,
        state: &ExecutionState,
        unit: &str,
        status: UnitStatus,
        reason: Option<String>,
        produced: Vec<String>,
    ) -> EngineResult<ExecutionState> {
        let (next, ()) = self.apply(state, |s| {
            graph::record_unit_status(s, unit, status, reason, produced)
        })?;
        tracing::info!(instance = %next.id, unit, %status, "recorded unit status");
        Ok(next)
    }

    pub fn jump_to_phase(
        &self,
        state: &ExecutionState,
        phase: &str,
        override_rules: bool,
    ) -> EngineResult<ExecutionState> {
        let (next, kind) = self.apply(state, |s| graph::jump_to_phase(s, phase, override_rules))?;
        if kind == graph::JumpKind::Override {
            tracing::warn!(instance = %next.id, phase, "phase jump forced by override");
        } else {
            tracing::info!(instance = %next.id, phase, %kind, "jumped to phase");
        }
        Ok(next)
    }

    pub fn add_follow_up_unit(
        &self,
        state: &ExecutionState,
        unit: &str,
        deliverables: Vec<String>,
    ) -> EngineResult<ExecutionState> {
        let (next, ()) =
            self.apply(state, |s| graph::add_follow_up_unit(s, unit, deliverables))?;
        tracing::info!(instance = %next.id, unit, "added follow-up unit");
        Ok(next)
    }

    pub fn submit_human_decision(
        &self,
        state: &ExecutionState,
        decision: HumanDecision,
        feedback: Option<String>,
    ) -> EngineResult<ExecutionState> {
        let (next, ()) = self.apply(state, |s| {
            let idx = ensure_active(s)?;
            let gate =
                self.gates
                    .submit_human_decision(&s.phases[idx], s.activity, decision, feedback)?;
            let detail = match decision {
                HumanDecision::Approve => format!("{} approved", gate.id),
                HumanDecision::Changes => format!(
                    "{} changes: {}",
                    gate.id,
                    gate.feedback.as_deref().unwrap_or_default()
                ),
            };
            s.phases[idx].gate = Some(gate);
            s.record_audit("gate", detail, false);
            s.touch();
            Ok(())
        })?;
        tracing::info!(instance = %next.id, ?decision, "human gate decision");
        Ok(next)
    }

    pub fn skip_gate(
        &self,
        state: &ExecutionState,
        reason: &str,
        override_required: bool,
    ) -> EngineResult<ExecutionState> {
        let (next, required) = self.apply(state, |s| {
            let idx = ensure_active(s)?;
            let gate = self.gates.skip(&s.phases[idx], reason, override_required)?;
            let required = gate.required;
            s.record_audit(
                "skip-gate",
                format!("{}: {}", gate.id, reason.trim()),
                required,
            );
            s.phases[idx].gate = Some(gate);
            s.touch();
            Ok(required)
        })?;
        if required {
            tracing::warn!(instance = %next.id, reason, "required gate skipped by override");
        } else {
            tracing::info!(instance = %next.id, reason, "optional gate skipped");
        }
        Ok(next)
    }

    /// Force a conditional gate to pass or reject. Always audited.
    pub fn force_gate(
        &self,
        state: &ExecutionState,
        pass: bool,
        reason: &str,
    ) -> EngineResult<ExecutionState> {
        let (next, ()) = self.apply(state, |s| {
            let idx = ensure_active(s)?;
            let gate = self.gates.force(&s.phases[idx], s.activity, pass, reason)?;
            s.record_audit(
                if pass { "force-pass" } else { "force-reject" },
                format!("{}: {}", gate.id, reason.trim()),
                true,
            );
            s.phases[idx].gate = Some(gate);
            s.touch();
            Ok(())
        })?;
        tracing::warn!(instance = %next.id, pass, reason, "conditional gate forced");
        Ok(next)
    }

    /// Collect signals and re-evaluate the active gate. Only commits when the
    /// gate changed.
    pub fn refresh_gate(&self, state: &ExecutionState) -> EngineResult<ExecutionState> {
        let idx = ensure_active(state)?;
        let phase = &state.phases[idx];
        let Some(gate) = &phase.gate else {
            return Ok(state.clone());
        };

        let signals = self.signals.collect(&state.id, gate.kind.signals())?;
        let refreshed = self.gates.refresh(phase, state.activity, &signals)?;
        if &refreshed == gate {
            return Ok(state.clone());
        }

        let (next, ()) = self.apply(state, |s| {
            s.record_audit(
                "gate",
                format!("{} {} -> {}", refreshed.id, gate.status, refreshed.status),
                false,
            );
            s.phases[idx].gate = Some(refreshed.clone());
            s.touch();
            Ok(())
        })?;
        tracing::info!(instance = %next.id, gate = %refreshed.id, status = %refreshed.status, "gate re-evaluated");
        Ok(next)
    }

    pub fn pause(&self, state: &ExecutionState, note: Option<String>) -> EngineResult<ExecutionState> {
        let (next, ()) = self.apply(state, |s| graph::pause(s, note))?;
        tracing::info!(instance = %next.id, "paused workflow");
        Ok(next)
    }

    /// Execute the given open unit of the active phase.
    ///
    /// The unit is committed as `running` before the executor is called, so
    /// an interrupted run is visible and re-executed by the next `continue`.
    pub fn run_unit(&self, state: &ExecutionState, unit: &str) -> EngineResult<(ExecutionState, Progress)> {
        let Some(executor) = &self.executor else {
            return Ok((
                state.clone(),
                Progress::NeedsExecutor {
                    unit: unit.to_string(),
                },
            ));
        };

        let idx = ensure_active(state)?;
        let current_status = state.phases[idx]
            .unit(unit)
            .map(|u| u.status)
            .ok_or_else(|| crate::error::EngineError::UnknownUnit {
                unit: unit.to_string(),
                phase: state.phases[idx].id.clone(),
            })?;

        let running = if current_status == UnitStatus::Running {
            state.clone()
        } else {
            self.record_unit_status(state, unit, UnitStatus::Running, None, Vec::new())?
        };

        let phase = &running.phases[idx];
        let context = UnitContext {
            instance: running.id.clone(),
            loop_id: running.loop_id.clone(),
            phase: phase.id.clone(),
            unit: unit.to_string(),
            deliverables: phase
                .unit(unit)
                .map(|u| u.deliverables.clone())
                .unwrap_or_default(),
            feedback: phase.gate.as_ref().and_then(|g| g.feedback.clone()),
        };

        let outcome = executor.execute(&context)?;
        let next = self.record_unit_status(
            &running,
            unit,
            outcome.status,
            outcome.reason.clone(),
            outcome.deliverables,
        )?;

        Ok((
            next,
            Progress::RanUnit {
                unit: unit.to_string(),
                status: outcome.status,
                reason: outcome.reason,
            },
        ))
    }

    /// One step forward: resume, run the next open unit, or settle the gate
    /// and advance.
    pub fn continue_workflow(&self, state: &ExecutionState) -> EngineResult<(ExecutionState, Progress)> {
        if state.is_terminal() {
            if self.store.exists(&state.id) {
                self.finish(state)?;
            }
            return Ok((state.clone(), Progress::Completed));
        }

        let current = if state.is_suspended() {
            self.apply(state, |s| {
                graph::resume(s);
                Ok(())
            })?
            .0
        } else {
            state.clone()
        };

        let idx = ensure_active(&current)?;
        // a passed gate closes the phase; open optional units are left behind
        let gate_passed = current.phases[idx]
            .gate
            .as_ref()
            .is_some_and(|g| g.is_passed());
        if !gate_passed {
            if let Some(unit) = current.phases[idx].next_open_unit() {
                let unit = unit.id.clone();
                return self.run_unit(&current, &unit);
            }
        }

        let current = match current.phases[idx].gate.as_ref().map(|g| &g.kind) {
            Some(GateKind::Auto { .. }) | Some(GateKind::Conditional { .. }) => {
                self.refresh_gate(&current)?
            }
            _ => current,
        };

        let phase = &current.phases[idx];
        if let Some(gate) = &phase.gate {
            if !gate.is_passed() && !phase.required_units_satisfied() {
                return Ok((
                    current.clone(),
                    Progress::Blocked {
                        reason: format!(
                            "gate '{}' cannot pass until required units are complete or skipped: {}",
                            gate.id,
                            phase.outstanding_units().join(", ")
                        ),
                    },
                ));
            }
            match gate.status {
                GateStatus::Passed => {}
                GateStatus::Rejected => {
                    let progress = Progress::GateRejected {
                        gate: gate.id.clone(),
                        feedback: gate.feedback.clone(),
                    };
                    return Ok((current.clone(), progress));
                }
                GateStatus::Pending if gate.kind == GateKind::Human => {
                    let progress = Progress::AwaitingApproval {
                        gate: gate.id.clone(),
                    };
                    return Ok((current.clone(), progress));
                }
                GateStatus::Pending => {
                    let signals = self.signals.collect(&current.id, gate.kind.signals())?;
                    let progress = Progress::AwaitingSignals {
                        gate: gate.id.clone(),
                        unmet: unmet_signals(gate, &signals),
                    };
                    return Ok((current.clone(), progress));
                }
            }
        }

        let (next, advance) = self.apply(&current, graph::advance_phase)?;
        tracing::info!(
            instance = %next.id,
            from = %advance.from,
            to = advance.to.as_deref().unwrap_or("complete"),
            "advanced phase"
        );
        Ok((
            next,
            Progress::Advanced {
                from: advance.from,
                to: advance.to,
            },
        ))
    }
}
