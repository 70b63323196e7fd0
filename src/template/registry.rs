//! Template lookup and instantiation

use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::models::{
    ExecutionState, Gate, Phase, PhaseStatus, WorkUnit, STATE_SCHEMA_VERSION,
};

use super::schema::TemplateDefinition;

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("feature.yaml", include_str!("../../templates/feature.yaml")),
    ("bugfix.yaml", include_str!("../../templates/bugfix.yaml")),
];

/// Known templates keyed by loop id.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, TemplateDefinition>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the templates shipped with the binary.
    pub fn builtin() -> EngineResult<Self> {
        let mut registry = Self::new();
        for (name, content) in BUILTIN_TEMPLATES {
            let template = TemplateDefinition::parse_yaml(content).map_err(|e| {
                EngineError::InvalidTemplate(format!("built-in template {name}: {e}"))
            })?;
            registry.register(template);
        }
        Ok(registry)
    }

    /// Load `*.yaml`/`*.yml` templates from a directory, replacing built-ins
    /// with the same id. A missing directory is not an error.
    pub fn load_dir(&mut self, dir: &Path) -> EngineResult<usize> {
        if !dir.exists() {
            return Ok(0);
        }

        let mut paths: Vec<_> = fs::read_dir(dir)
            .map_err(|e| EngineError::io(dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        paths.sort();

        for path in &paths {
            let content = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
            let template = TemplateDefinition::parse_yaml(&content).map_err(|e| {
                EngineError::InvalidTemplate(format!("{}: {e}", path.display()))
            })?;
            tracing::debug!(template = %template.id, path = %path.display(), "loaded template");
            self.register(template);
        }

        Ok(paths.len())
    }

    pub fn register(&mut self, template: TemplateDefinition) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, id: &str) -> EngineResult<&TemplateDefinition> {
        self.templates.get(id).ok_or_else(|| {
            EngineError::InvalidTemplate(format!(
                "unknown template '{id}' (available: {})",
                self.templates.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn list(&self) -> impl Iterator<Item = &TemplateDefinition> {
        self.templates.values()
    }

    /// Build the initial execution state for a template and mode.
    ///
    /// The first phase of the mode is active, every other phase pending.
    /// Nothing is persisted here.
    pub fn instantiate(&self, template_id: &str, mode: Option<&str>) -> EngineResult<ExecutionState> {
        let template = self.get(template_id)?;
        let mode = template.resolve_mode(mode)?;
        let selected = template.phases_for_mode(&mode)?;

        let phases: Vec<Phase> = selected
            .iter()
            .enumerate()
            .map(|(idx, def)| Phase {
                id: def.id.clone(),
                name: def.name.clone(),
                status: if idx == 0 {
                    PhaseStatus::Active
                } else {
                    PhaseStatus::Pending
                },
                units: def
                    .units
                    .iter()
                    .map(|u| {
                        let mut unit = WorkUnit::new(u.id.clone(), u.deliverables.clone());
                        unit.optional = u.optional;
                        unit
                    })
                    .collect(),
                gate: def
                    .gate
                    .as_ref()
                    .map(|g| Gate::new(g.id.clone(), g.kind.clone(), g.required)),
            })
            .collect();

        let jumps = template
            .jumps
            .iter()
            .filter(|e| {
                phases.iter().any(|p| p.id == e.from) && phases.iter().any(|p| p.id == e.to)
            })
            .cloned()
            .collect();

        let now = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let id = format!(
            "{}-{}-{}",
            template.id,
            now.format("%Y%m%d%H%M%S"),
            &suffix[..8]
        );

        let mut state = ExecutionState {
            schema_version: STATE_SCHEMA_VERSION,
            id,
            loop_id: template.id.clone(),
            template_version: template.version.clone(),
            mode: mode.clone(),
            current_phase: phases.first().map(|p| p.id.clone()),
            phases,
            jumps,
            revision: 0,
            activity: 0,
            suspended: None,
            audit: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        state.record_audit(
            "initialize",
            format!("{} v{} mode={mode}", template.id, template.version),
            false,
        );

        Ok(state)
    }
}
