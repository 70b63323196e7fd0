//! Workflow template schema and validation

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{EngineError, EngineResult};
use crate::models::{GateKind, PhaseEdge};
use crate::validation::validate_id;

/// Mode used when a template declares no modes.
pub const DEFAULT_MODE: &str = "default";

/// A loop definition: ordered phases, the modes that select among them and
/// the non-linear jumps allowed without an override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefinition {
    pub id: String,
    /// Semantic version, e.g. `1.2.0`.
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_mode: Option<String>,
    pub phases: Vec<PhaseDefinition>,
    /// Mode name -> ordered phase ids.
    #[serde(default)]
    pub modes: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub jumps: Vec<PhaseEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDefinition {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub units: Vec<UnitDefinition>,
    #[serde(default)]
    pub gate: Option<GateDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDefinition {
    pub id: String,
    #[serde(default)]
    pub deliverables: Vec<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDefinition {
    pub id: String,
    #[serde(flatten)]
    pub kind: GateKind,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl TemplateDefinition {
    pub fn parse_yaml(content: &str) -> EngineResult<Self> {
        let template: TemplateDefinition = serde_yaml::from_str(content)
            .map_err(|e| EngineError::InvalidTemplate(format!("failed to parse template: {e}")))?;
        template.validate()?;
        Ok(template)
    }

    /// Check the structural rules every template has to satisfy.
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |msg: String| EngineError::InvalidTemplate(format!("{}: {msg}", self.id));

        validate_id(&self.id).map_err(|e| EngineError::InvalidTemplate(e.to_string()))?;
        semver::Version::parse(&self.version)
            .map_err(|e| invalid(format!("version '{}' is not semver: {e}", self.version)))?;

        if self.phases.is_empty() {
            return Err(invalid("template declares no phases".to_string()));
        }

        let mut phase_ids = HashSet::new();
        let mut gate_ids = HashSet::new();
        for phase in &self.phases {
            validate_id(&phase.id).map_err(|e| invalid(e.to_string()))?;
            if !phase_ids.insert(phase.id.as_str()) {
                return Err(invalid(format!("duplicate phase id '{}'", phase.id)));
            }

            let mut unit_ids = HashSet::new();
            for unit in &phase.units {
                validate_id(&unit.id).map_err(|e| invalid(e.to_string()))?;
                if !unit_ids.insert(unit.id.as_str()) {
                    return Err(invalid(format!(
                        "duplicate unit id '{}' in phase '{}'",
                        unit.id, phase.id
                    )));
                }
            }

            if let Some(gate) = &phase.gate {
                validate_id(&gate.id).map_err(|e| invalid(e.to_string()))?;
                if !gate_ids.insert(gate.id.as_str()) {
                    return Err(invalid(format!("duplicate gate id '{}'", gate.id)));
                }
                if !matches!(gate.kind, GateKind::Human) && gate.kind.signals().is_empty() {
                    return Err(invalid(format!(
                        "gate '{}' evaluates signals but names none",
                        gate.id
                    )));
                }
            }
        }

        for (mode, phases) in &self.modes {
            if phases.is_empty() {
                return Err(invalid(format!("mode '{mode}' selects no phases")));
            }
            let mut seen = HashSet::new();
            for phase in phases {
                if !phase_ids.contains(phase.as_str()) {
                    return Err(invalid(format!("mode '{mode}' references unknown phase '{phase}'")));
                }
                if !seen.insert(phase.as_str()) {
                    return Err(invalid(format!("mode '{mode}' lists phase '{phase}' twice")));
                }
            }
        }

        if let Some(default) = &self.default_mode {
            if !self.mode_names().contains(default) {
                return Err(invalid(format!("default mode '{default}' is not declared")));
            }
        }

        for edge in &self.jumps {
            if !phase_ids.contains(edge.from.as_str()) || !phase_ids.contains(edge.to.as_str()) {
                return Err(invalid(format!(
                    "jump {} -> {} references an unknown phase",
                    edge.from, edge.to
                )));
            }
        }

        Ok(())
    }

    /// Mode names in declaration order, or the implicit default mode.
    pub fn mode_names(&self) -> Vec<String> {
        if self.modes.is_empty() {
            vec![DEFAULT_MODE.to_string()]
        } else {
            self.modes.keys().cloned().collect()
        }
    }

    /// Resolve the requested mode, falling back to the declared default.
    pub fn resolve_mode(&self, requested: Option<&str>) -> EngineResult<String> {
        match requested {
            Some(mode) => {
                if self.mode_names().iter().any(|m| m == mode) {
                    Ok(mode.to_string())
                } else {
                    Err(EngineError::InvalidTemplate(format!(
                        "template '{}' has no mode '{mode}' (available: {})",
                        self.id,
                        self.mode_names().join(", ")
                    )))
                }
            }
            None => match (&self.default_mode, self.modes.len()) {
                (Some(default), _) => Ok(default.clone()),
                (None, 0) => Ok(DEFAULT_MODE.to_string()),
                (None, 1) => Ok(self.mode_names().remove(0)),
                (None, _) => Err(EngineError::InvalidTemplate(format!(
                    "template '{}' declares several modes; choose one of: {}",
                    self.id,
                    self.mode_names().join(", ")
                ))),
            },
        }
    }

    /// Phase definitions selected by a mode, in mode order.
    pub fn phases_for_mode(&self, mode: &str) -> EngineResult<Vec<&PhaseDefinition>> {
        let mode = self.resolve_mode(Some(mode))?;
        if self.modes.is_empty() {
            return Ok(self.phases.iter().collect());
        }

        Ok(self.modes[&mode]
            .iter()
            .filter_map(|id| self.phases.iter().find(|p| &p.id == id))
            .collect())
    }
}
