//! phasegate: a phase-gate workflow engine with a leverage-ranked execution
//! queue.
//!
//! Workflows are instantiated from YAML templates into an
//! [`ExecutionState`](models::ExecutionState) persisted under `.phasegate/`.
//! The [`Engine`](workflow::Engine) moves them through phases, gates each
//! transition, and archives completed runs. The [`planning`] module scores
//! candidate work and keeps a bounded, expiring queue of what to run next.

pub mod commands;
pub mod directive;
pub mod error;
pub mod fs;
pub mod models;
pub mod parser;
pub mod planning;
pub mod template;
pub mod validation;
pub mod workflow;

pub use error::{EngineError, EngineResult, ErrorCategory};
