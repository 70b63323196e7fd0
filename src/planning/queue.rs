//! Ranked, bounded, expiring execution queue

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::Candidate;

use super::blockers::{blocker_status, resolve_blockers, ResolutionTracker};
use super::scorer::{compare_ranked, score_all, WeightTable};

/// One queue slot. Ranks are contiguous and start at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub rank: usize,
    pub candidate: Candidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Queue {
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub entries: Vec<QueueEntry>,
}

/// A candidate held out of the queue by unresolved blockers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedCandidate {
    pub id: String,
    pub blocked_by: Vec<String>,
}

/// Result of a planning pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub queue: Queue,
    pub blocked: Vec<BlockedCandidate>,
    /// Unblocked candidates that ranked below the limit, in rank order.
    pub deferred: Vec<String>,
}

/// Queue mutation. Ranks and positions are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueOp {
    Insert { candidate: Candidate, position: usize },
    Remove { rank: usize },
    Reorder { rank: usize, position: usize },
}

/// What a mutation changed besides the requested operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationReport {
    /// Entry removed by a `Remove` op.
    pub removed: Option<Candidate>,
    /// Entries dropped because they became blocked.
    pub evicted: Vec<BlockedCandidate>,
}

/// What a claim handed out and what it dropped on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimReport {
    /// Top actionable entry, `None` when nothing actionable is left.
    pub claimed: Option<Candidate>,
    /// Entries dropped because they became blocked since the build.
    pub evicted: Vec<BlockedCandidate>,
}

/// Planning pass configuration.
#[derive(Debug, Clone)]
pub struct QueueBuilder {
    pub weights: WeightTable,
    pub limit: usize,
    pub ttl: Duration,
}

impl QueueBuilder {
    pub fn new(weights: WeightTable, limit: usize, ttl: Duration) -> Self {
        Self {
            weights,
            limit,
            ttl,
        }
    }

    pub fn build(
        &self,
        candidates: Vec<Candidate>,
        resolved: &dyn ResolutionTracker,
    ) -> EngineResult<BuildReport> {
        self.build_at(candidates, resolved, Utc::now())
    }

    /// Rescore, filter blocked candidates, rank and truncate.
    ///
    /// Any cycle in the blockedBy graph aborts the pass before a queue exists.
    pub fn build_at(
        &self,
        mut candidates: Vec<Candidate>,
        resolved: &dyn ResolutionTracker,
        now: DateTime<Utc>,
    ) -> EngineResult<BuildReport> {
        let statuses = resolve_blockers(&candidates, resolved)?;

        score_all(&mut candidates, &self.weights);

        let mut blocked = Vec::new();
        let mut ready = Vec::new();
        for candidate in candidates {
            match statuses.get(&candidate.id) {
                Some(status) if status.blocked => blocked.push(BlockedCandidate {
                    id: candidate.id.clone(),
                    blocked_by: status.blocked_by.iter().cloned().collect(),
                }),
                _ => ready.push(candidate),
            }
        }
        blocked.sort_by(|a, b| a.id.cmp(&b.id));

        ready.sort_by(compare_ranked);
        let deferred = if ready.len() > self.limit {
            ready
                .split_off(self.limit)
                .into_iter()
                .map(|c| c.id)
                .collect()
        } else {
            Vec::new()
        };

        let mut queue = Queue {
            generated_at: now,
            expires_at: now + self.ttl,
            entries: ready
                .into_iter()
                .map(|candidate| QueueEntry { rank: 0, candidate })
                .collect(),
        };
        queue.renumber();

        tracing::info!(
            queued = queue.entries.len(),
            blocked = blocked.len(),
            deferred = deferred.len(),
            expires_at = %queue.expires_at,
            "built queue"
        );

        Ok(BuildReport {
            queue,
            blocked,
            deferred,
        })
    }
}

impl Queue {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.candidate.id.as_str()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.candidate.id == id)
    }

    fn renumber(&mut self) {
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            entry.rank = idx + 1;
        }
    }

    fn check_rank(&self, rank: usize) -> EngineResult<usize> {
        if rank == 0 || rank > self.entries.len() {
            return Err(EngineError::RankOutOfRange {
                rank,
                len: self.entries.len(),
            });
        }
        Ok(rank - 1)
    }

    /// Apply one mutation, then evict newly blocked entries and renumber.
    ///
    /// On error the queue is left exactly as it was.
    pub fn mutate(
        &mut self,
        op: QueueOp,
        resolved: &dyn ResolutionTracker,
    ) -> EngineResult<MutationReport> {
        let mut next = self.clone();
        let mut report = MutationReport::default();

        match op {
            QueueOp::Insert {
                candidate,
                position,
            } => {
                if next.contains(&candidate.id) {
                    return Err(EngineError::InvalidTransition(format!(
                        "candidate '{}' is already queued",
                        candidate.id
                    )));
                }
                let status = blocker_status(&candidate, resolved);
                if status.blocked {
                    return Err(EngineError::CandidateBlocked {
                        id: candidate.id,
                        blocked_by: status.blocked_by.into_iter().collect(),
                    });
                }
                if position == 0 || position > next.entries.len() + 1 {
                    return Err(EngineError::RankOutOfRange {
                        rank: position,
                        len: next.entries.len(),
                    });
                }
                next.entries.insert(
                    position - 1,
                    QueueEntry { rank: 0, candidate },
                );
            }
            QueueOp::Remove { rank } => {
                let idx = next.check_rank(rank)?;
                report.removed = Some(next.entries.remove(idx).candidate);
            }
            QueueOp::Reorder { rank, position } => {
                let from = next.check_rank(rank)?;
                let to = next.check_rank(position)?;
                let entry = next.entries.remove(from);
                next.entries.insert(to, entry);
            }
        }

        report.evicted = next.evict_blocked(resolved);
        next.renumber();
        *self = next;
        Ok(report)
    }

    /// Drop entries whose blockers are no longer all resolved.
    pub fn evict_blocked(&mut self, resolved: &dyn ResolutionTracker) -> Vec<BlockedCandidate> {
        let mut evicted = Vec::new();
        self.entries.retain(|entry| {
            let status = blocker_status(&entry.candidate, resolved);
            if status.blocked {
                evicted.push(BlockedCandidate {
                    id: entry.candidate.id.clone(),
                    blocked_by: status.blocked_by.into_iter().collect(),
                });
                false
            } else {
                true
            }
        });
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "evicted blocked queue entries");
            self.renumber();
        }
        evicted
    }

    /// Remove and return the top actionable entry.
    ///
    /// Fails with `StaleQueue` once `now` reaches `expires_at`. Entries that
    /// became blocked since the build are evicted first and reported.
    pub fn claim(
        &mut self,
        resolved: &dyn ResolutionTracker,
        now: DateTime<Utc>,
    ) -> EngineResult<ClaimReport> {
        self.claim_checked(resolved, now, |_| Ok(()))
    }

    /// Like [`Queue::claim`], but `accept` vets the top entry before it is
    /// removed. If `accept` fails, the queue is left exactly as it was.
    pub fn claim_checked(
        &mut self,
        resolved: &dyn ResolutionTracker,
        now: DateTime<Utc>,
        accept: impl FnOnce(&Candidate) -> EngineResult<()>,
    ) -> EngineResult<ClaimReport> {
        if self.is_expired(now) {
            return Err(EngineError::StaleQueue(self.expires_at));
        }
        let mut next = self.clone();
        let evicted = next.evict_blocked(resolved);

        let claimed = match next.entries.first() {
            None => None,
            Some(top) => {
                accept(&top.candidate)?;
                let entry = next.entries.remove(0);
                next.renumber();
                tracing::info!(candidate = %entry.candidate.id, remaining = next.entries.len(), "claimed queue entry");
                Some(entry.candidate)
            }
        };

        *self = next;
        Ok(ClaimReport { claimed, evicted })
    }
}
