//! Phase-gate workflow execution
//!
//! `graph` and `gates` hold the pure transition rules, `store` and `archive`
//! the durable side, `executor` and `signals` the outside world. [`Engine`]
//! ties them together.

pub mod archive;
pub mod engine;
pub mod executor;
pub mod gates;
pub mod graph;
pub mod process;
pub mod signals;
pub mod store;


pub use archive::{ArchiveManifest, ArchiveRecord, ArchiveSink, FsArchive};
pub use engine::{Engine, Progress};
pub use executor::{ShellExecutor, UnitContext, UnitExecutor, UnitOutcome};
pub use gates::{evaluate_auto, unmet_signals, GateEvaluator};
pub use graph::{Advance, JumpKind};
pub use signals::{
    CommandSignals, CompositeSignals, RecordedSignals, SignalMap, SignalSource, StaticSignals,
};
pub use store::{FsStateStore, StateStore};
