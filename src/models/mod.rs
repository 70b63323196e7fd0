pub mod candidate;
pub mod gate;
pub mod phase;
pub mod state;
pub mod unit;

pub use candidate::Candidate;
pub use gate::{ApprovalType, Gate, GateKind, GateStatus, HumanDecision};
pub use phase::{Phase, PhaseEdge, PhaseStatus};
pub use state::{AuditEntry, ExecutionState, SuspendPoint, STATE_SCHEMA_VERSION};
pub use unit::{UnitStatus, WorkUnit};
