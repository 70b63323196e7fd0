use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A unit of potential future work considered during planning.
///
/// Candidates are rescored on every planning pass; `score` is never treated
/// as authoritative across passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    /// What the work targets (a module, a report, a service).
    pub target: String,
    /// Loop type the candidate would be executed with.
    #[serde(default)]
    pub category: Option<String>,
    /// Raw sub-score per criterion name.
    #[serde(default)]
    pub subscores: BTreeMap<String, f64>,
    /// Estimated effort, used as the first tie breaker.
    #[serde(default)]
    pub effort: f64,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub blocked_by: BTreeSet<String>,
    #[serde(default)]
    pub unlocks: BTreeSet<String>,
}

impl Candidate {
    pub fn new(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: target.into(),
            category: None,
            subscores: BTreeMap::new(),
            effort: 0.0,
            score: None,
            blocked_by: BTreeSet::new(),
            unlocks: BTreeSet::new(),
        }
    }

    /// Raw value for a criterion.
    ///
    /// `unlocks` falls back to the number of ids in the unlocks set when no
    /// explicit sub-score was supplied.
    pub fn subscore(&self, criterion: &str) -> Option<f64> {
        match self.subscores.get(criterion) {
            Some(v) => Some(*v),
            None if criterion == "unlocks" => Some(self.unlocks.len() as f64),
            None => None,
        }
    }

    /// Score used for ranking; unscored candidates rank last.
    pub fn rank_score(&self) -> f64 {
        self.score.filter(|s| s.is_finite()).unwrap_or(f64::NEG_INFINITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlocks_fallback() {
        let mut c = Candidate::new("auth", "auth-service");
        c.unlocks.insert("billing".into());
        c.unlocks.insert("sso".into());
        assert_eq!(c.subscore("unlocks"), Some(2.0));
        assert_eq!(c.subscore("impact"), None);

        c.subscores.insert("unlocks".into(), 7.0);
        assert_eq!(c.subscore("unlocks"), Some(7.0));
    }

    #[test]
    fn test_candidate_yaml_defaults() {
        let c: Candidate = serde_yaml::from_str("id: a\ntarget: parser\n").unwrap();
        assert!(c.blocked_by.is_empty());
        assert_eq!(c.effort, 0.0);
        assert_eq!(c.rank_score(), f64::NEG_INFINITY);
    }
}
