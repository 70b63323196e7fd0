//! Planning: leverage scoring, blocker resolution and the execution queue.
//!
//! A planning pass rescores every candidate from scratch, drops the ones
//! still blocked, ranks the rest and keeps the top `limit` as a queue that
//! expires after `ttl`.

pub mod blockers;
pub mod queue;
pub mod scorer;
pub mod store;


pub use blockers::{detect_cycles, resolve_blockers, BlockerStatus, ResolutionTracker};
pub use queue::{
    BlockedCandidate, BuildReport, ClaimReport, MutationReport, Queue, QueueBuilder, QueueEntry,
    QueueOp,
};
pub use scorer::{score, score_all, Criterion, Normalizer, WeightTable};
pub use store::{load_candidates, parse_candidates, QueueStore, ResolvedSet, SharedQueue};
