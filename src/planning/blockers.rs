//! Blocker resolution and cycle detection over the blockedBy graph

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::error::{EngineError, EngineResult};
use crate::models::Candidate;

/// Source of truth for which targets have been resolved.
///
/// Resolution is tracked outside the planner (finished workflows, manual
/// `phasegate resolve`), so the resolver only asks.
pub trait ResolutionTracker {
    fn is_resolved(&self, id: &str) -> bool;
}

impl ResolutionTracker for BTreeSet<String> {
    fn is_resolved(&self, id: &str) -> bool {
        self.contains(id)
    }
}

impl ResolutionTracker for HashSet<String> {
    fn is_resolved(&self, id: &str) -> bool {
        self.contains(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockerStatus {
    pub blocked: bool,
    /// The still-unresolved subset of the candidate's blockedBy set.
    pub blocked_by: BTreeSet<String>,
}

/// Blocker status of every candidate, keyed by id.
///
/// Fails with `CyclicDependency` if the blockedBy graph has a cycle anywhere,
/// before any status is computed.
pub fn resolve_blockers(
    candidates: &[Candidate],
    resolved: &dyn ResolutionTracker,
) -> EngineResult<BTreeMap<String, BlockerStatus>> {
    ensure_unique_ids(candidates)?;
    detect_cycles(candidates)?;

    Ok(candidates
        .iter()
        .map(|c| (c.id.clone(), blocker_status(c, resolved)))
        .collect())
}

/// Blocker status of a single candidate, without graph checks.
pub fn blocker_status(candidate: &Candidate, resolved: &dyn ResolutionTracker) -> BlockerStatus {
    let blocked_by: BTreeSet<String> = candidate
        .blocked_by
        .iter()
        .filter(|id| !resolved.is_resolved(id))
        .cloned()
        .collect();
    BlockerStatus {
        blocked: !blocked_by.is_empty(),
        blocked_by,
    }
}

pub(crate) fn ensure_unique_ids(candidates: &[Candidate]) -> EngineResult<()> {
    let mut seen = HashSet::new();
    for candidate in candidates {
        if !seen.insert(candidate.id.as_str()) {
            return Err(EngineError::InvalidConfig(format!(
                "duplicate candidate id '{}'",
                candidate.id
            )));
        }
    }
    Ok(())
}

/// Detect cycles in the blockedBy graph using DFS.
///
/// Ids that are not candidates are external targets and act as leaves. A
/// candidate blocked by itself is a cycle too. The walk is iterative so deep
/// chains do not exhaust the stack.
pub fn detect_cycles(candidates: &[Candidate]) -> EngineResult<()> {
    let edges: HashMap<&str, Vec<&str>> = candidates
        .iter()
        .map(|c| (c.id.as_str(), c.blocked_by.iter().map(String::as_str).collect()))
        .collect();

    let mut visited: HashSet<&str> = HashSet::new();

    let mut roots: Vec<&str> = edges.keys().copied().collect();
    roots.sort_unstable();

    for root in roots {
        if visited.contains(root) {
            continue;
        }

        let mut on_path: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();
        // (node, index of the next dependency to inspect)
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        visited.insert(root);
        on_path.insert(root);
        path.push(root);

        while let Some((node, next)) = stack.last_mut() {
            let deps = &edges[*node];
            if *next >= deps.len() {
                on_path.remove(*node);
                path.pop();
                stack.pop();
                continue;
            }

            let dep = deps[*next];
            *next += 1;

            if !edges.contains_key(dep) {
                continue;
            }
            if on_path.contains(dep) {
                let start = path.iter().position(|p| *p == dep).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(dep.to_string());
                return Err(EngineError::CyclicDependency(cycle));
            }
            if visited.insert(dep) {
                on_path.insert(dep);
                path.push(dep);
                stack.push((dep, 0));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, blocked_by: &[&str]) -> Candidate {
        let mut c = Candidate::new(id, id);
        c.blocked_by = blocked_by.iter().map(|s| s.to_string()).collect();
        c
    }

    #[test]
    fn test_unresolved_blocker_blocks() {
        let candidates = vec![candidate("a", &[]), candidate("b", &["a"])];
        let resolved = BTreeSet::<String>::new();

        let status = resolve_blockers(&candidates, &resolved).unwrap();
        assert!(!status["a"].blocked);
        assert!(status["b"].blocked);
        assert_eq!(
            status["b"].blocked_by,
            BTreeSet::from(["a".to_string()])
        );
    }

    #[test]
    fn test_resolved_blocker_unblocks() {
        let candidates = vec![candidate("a", &[]), candidate("b", &["a", "infra-upgrade"])];
        let resolved: BTreeSet<String> = ["a".to_string()].into();

        let status = resolve_blockers(&candidates, &resolved).unwrap();
        assert!(status["b"].blocked);
        assert_eq!(
            status["b"].blocked_by,
            BTreeSet::from(["infra-upgrade".to_string()])
        );

        let resolved: HashSet<String> = ["a".to_string(), "infra-upgrade".to_string()].into();
        let status = resolve_blockers(&candidates, &resolved).unwrap();
        assert!(!status["b"].blocked);
    }

    #[test]
    fn test_two_cycle_detected() {
        let candidates = vec![candidate("a", &["b"]), candidate("b", &["a"])];
        let err = resolve_blockers(&candidates, &BTreeSet::<String>::new()).unwrap_err();
        match err {
            EngineError::CyclicDependency(path) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 3);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_block_is_a_cycle() {
        let candidates = vec![candidate("a", &["a"])];
        assert!(matches!(
            detect_cycles(&candidates),
            Err(EngineError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_cycle_found_at_any_position() {
        // Cycles of length 2..=6 placed behind an acyclic prefix of varying size.
        for prefix in [0usize, 1, 5, 40] {
            for len in 2..=6usize {
                let mut candidates: Vec<Candidate> = (0..prefix)
                    .map(|i| {
                        let blockers: Vec<String> =
                            if i > 0 { vec![format!("p{}", i - 1)] } else { vec![] };
                        let refs: Vec<&str> = blockers.iter().map(String::as_str).collect();
                        candidate(&format!("p{i}"), &refs)
                    })
                    .collect();
                for j in 0..len {
                    let next = format!("c{}", (j + 1) % len);
                    candidates.push(candidate(&format!("c{j}"), &[next.as_str()]));
                }
                // Something outside the cycle depending on it
                candidates.push(candidate("tail", &["c0"]));
                candidates.reverse();

                let result = resolve_blockers(&candidates, &BTreeSet::<String>::new());
                assert!(
                    matches!(result, Err(EngineError::CyclicDependency(_))),
                    "prefix={prefix} len={len} not detected"
                );
            }
        }
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let candidates = vec![
            candidate("d", &["b", "c"]),
            candidate("b", &["a"]),
            candidate("c", &["a"]),
            candidate("a", &[]),
        ];
        assert!(detect_cycles(&candidates).is_ok());
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let candidates: Vec<Candidate> = (0..20_000)
            .map(|i| {
                let dep = format!("n{}", i + 1);
                candidate(&format!("n{i}"), &[dep.as_str()])
            })
            .collect();
        assert!(detect_cycles(&candidates).is_ok());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let candidates = vec![candidate("a", &[]), candidate("a", &[])];
        assert!(matches!(
            resolve_blockers(&candidates, &BTreeSet::<String>::new()),
            Err(EngineError::InvalidConfig(_))
        ));
    }
}
