//! Workflow templates: the loops an instance can be created from.

mod registry;
mod schema;


pub use registry::TemplateRegistry;
pub use schema::{
    GateDefinition, PhaseDefinition, TemplateDefinition, UnitDefinition, DEFAULT_MODE,
};
