//! Leverage scoring
//!
//! A candidate's score is `Σ weight_i * normalize_i(subscore_i)`. Criteria and
//! weights are configuration data: adding a criterion never touches this code.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};
use crate::models::Candidate;

/// Allowed distance of the weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Scores closer than this are ties.
pub const TIE_EPSILON: f64 = 1e-9;

/// Maps a raw sub-score onto `[0, 1]`, higher is better.
///
/// Every variant is total: NaN and infinite inputs map to `0.0`, finite
/// inputs outside the domain are clamped. Cost-like criteria (effort, time)
/// keep a "higher raw = higher normalized" mapping and take a negative weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Normalizer {
    /// `(raw - min) / (max - min)`, clamped.
    Linear { min: f64, max: f64 },
    /// Raw value already on `[0, 1]`, clamped.
    Ratio,
    /// `1.0` for any positive value, else `0.0`.
    Boolean,
    /// `min(raw, cap) / cap` for counts, negative counts read as zero.
    Count { cap: f64 },
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer::Linear {
            min: 0.0,
            max: 10.0,
        }
    }
}

impl Normalizer {
    pub fn normalize(&self, raw: f64) -> f64 {
        if !raw.is_finite() {
            return 0.0;
        }
        match *self {
            Normalizer::Linear { min, max } => ((raw - min) / (max - min)).clamp(0.0, 1.0),
            Normalizer::Ratio => raw.clamp(0.0, 1.0),
            Normalizer::Boolean => {
                if raw > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Normalizer::Count { cap } => raw.clamp(0.0, cap) / cap,
        }
    }

    fn validate(&self) -> Result<(), String> {
        match *self {
            Normalizer::Linear { min, max } => {
                if !min.is_finite() || !max.is_finite() || max <= min {
                    return Err(format!("linear range [{min}, {max}] is empty or not finite"));
                }
            }
            Normalizer::Count { cap } => {
                if !cap.is_finite() || cap <= 0.0 {
                    return Err(format!("count cap {cap} must be positive"));
                }
            }
            Normalizer::Ratio | Normalizer::Boolean => {}
        }
        Ok(())
    }
}

/// One row of the weight table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub normalize: Normalizer,
}

impl Criterion {
    pub fn new(name: impl Into<String>, weight: f64, normalize: Normalizer) -> Self {
        Self {
            name: name.into(),
            weight,
            normalize,
        }
    }
}

/// Validated criteria/weight table. Can only be built through [`WeightTable::new`].
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    criteria: Vec<Criterion>,
}

impl WeightTable {
    /// Validate a table: non-empty, unique names, finite weights summing to
    /// 1.0 within [`WEIGHT_TOLERANCE`], well-formed normalizers.
    pub fn new(criteria: Vec<Criterion>) -> EngineResult<Self> {
        if criteria.is_empty() {
            return Err(EngineError::InvalidWeights(
                "weight table has no criteria".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for criterion in &criteria {
            if criterion.name.trim().is_empty() {
                return Err(EngineError::InvalidWeights(
                    "criterion name cannot be empty".to_string(),
                ));
            }
            if !names.insert(criterion.name.as_str()) {
                return Err(EngineError::InvalidWeights(format!(
                    "duplicate criterion '{}'",
                    criterion.name
                )));
            }
            if !criterion.weight.is_finite() {
                return Err(EngineError::InvalidWeights(format!(
                    "criterion '{}' has a non-finite weight",
                    criterion.name
                )));
            }
            criterion.normalize.validate().map_err(|msg| {
                EngineError::InvalidWeights(format!("criterion '{}': {msg}", criterion.name))
            })?;
        }

        let sum: f64 = criteria.iter().map(|c| c.weight).sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(EngineError::InvalidWeights(format!(
                "weights sum to {sum}, expected 1.0 (±{WEIGHT_TOLERANCE})"
            )));
        }

        Ok(Self { criteria })
    }

    /// Impact, urgency, confidence and unlocks as benefits, effort as a cost.
    pub fn default_criteria() -> Vec<Criterion> {
        vec![
            Criterion::new("impact", 0.35, Normalizer::default()),
            Criterion::new("urgency", 0.25, Normalizer::default()),
            Criterion::new("confidence", 0.2, Normalizer::Ratio),
            Criterion::new("unlocks", 0.3, Normalizer::Count { cap: 5.0 }),
            Criterion::new("effort", -0.1, Normalizer::default()),
        ]
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            criteria: Self::default_criteria(),
        }
    }
}

/// Weighted, normalized leverage score. Missing sub-scores count as zero.
pub fn score(candidate: &Candidate, weights: &WeightTable) -> f64 {
    weights
        .criteria
        .iter()
        .map(|c| {
            let raw = candidate.subscore(&c.name).unwrap_or(0.0);
            c.weight * c.normalize.normalize(raw)
        })
        .sum()
}

/// Rescore every candidate in place, discarding previous scores.
pub fn score_all(candidates: &mut [Candidate], weights: &WeightTable) {
    for candidate in candidates.iter_mut() {
        candidate.score = Some(score(candidate, weights));
    }
}

/// Ranking order: descending score, then ascending effort, then id.
///
/// Scores are compared on a [`TIE_EPSILON`] grid so the order stays total.
pub fn compare_ranked(a: &Candidate, b: &Candidate) -> Ordering {
    score_key(b)
        .cmp(&score_key(a))
        .then_with(|| a.effort.total_cmp(&b.effort))
        .then_with(|| a.id.cmp(&b.id))
}

fn score_key(candidate: &Candidate) -> i64 {
    let score = candidate.rank_score();
    if score == f64::NEG_INFINITY {
        i64::MIN
    } else {
        (score / TIE_EPSILON).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, subscores: &[(&str, f64)]) -> Candidate {
        let mut c = Candidate::new(id, format!("target-{id}"));
        for (name, value) in subscores {
            c.subscores.insert(name.to_string(), *value);
        }
        c
    }

    #[test]
    fn test_normalizers_are_total() {
        let linear = Normalizer::Linear {
            min: 0.0,
            max: 10.0,
        };
        assert_eq!(linear.normalize(5.0), 0.5);
        assert_eq!(linear.normalize(-3.0), 0.0);
        assert_eq!(linear.normalize(42.0), 1.0);
        assert_eq!(linear.normalize(f64::NAN), 0.0);
        assert_eq!(linear.normalize(f64::INFINITY), 0.0);

        assert_eq!(Normalizer::Ratio.normalize(0.25), 0.25);
        assert_eq!(Normalizer::Ratio.normalize(3.0), 1.0);
        assert_eq!(Normalizer::Boolean.normalize(0.0), 0.0);
        assert_eq!(Normalizer::Boolean.normalize(0.1), 1.0);
        assert_eq!(Normalizer::Count { cap: 4.0 }.normalize(2.0), 0.5);
        assert_eq!(Normalizer::Count { cap: 4.0 }.normalize(9.0), 1.0);
        assert_eq!(Normalizer::Count { cap: 4.0 }.normalize(-1.0), 0.0);
    }

    #[test]
    fn test_default_table_is_valid() {
        let table = WeightTable::new(WeightTable::default_criteria()).unwrap();
        assert_eq!(table, WeightTable::default());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let err = WeightTable::new(vec![
            Criterion::new("impact", 0.5, Normalizer::default()),
            Criterion::new("urgency", 0.4, Normalizer::default()),
        ])
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidWeights(_)));

        // Within tolerance
        WeightTable::new(vec![
            Criterion::new("impact", 0.6000004, Normalizer::default()),
            Criterion::new("urgency", 0.4, Normalizer::default()),
        ])
        .unwrap();

        // Just outside tolerance
        assert!(WeightTable::new(vec![
            Criterion::new("impact", 0.600002, Normalizer::default()),
            Criterion::new("urgency", 0.4, Normalizer::default()),
        ])
        .is_err());
    }

    #[test]
    fn test_table_rejects_malformed_rows() {
        assert!(WeightTable::new(vec![]).is_err());
        assert!(WeightTable::new(vec![
            Criterion::new("impact", 0.5, Normalizer::default()),
            Criterion::new("impact", 0.5, Normalizer::default()),
        ])
        .is_err());
        assert!(WeightTable::new(vec![Criterion::new("x", f64::NAN, Normalizer::Ratio)]).is_err());
        assert!(WeightTable::new(vec![Criterion::new(
            "x",
            1.0,
            Normalizer::Linear { min: 5.0, max: 5.0 }
        )])
        .is_err());
        assert!(
            WeightTable::new(vec![Criterion::new("x", 1.0, Normalizer::Count { cap: 0.0 })])
                .is_err()
        );
    }

    #[test]
    fn test_score_with_negative_cost_weight() {
        let table = WeightTable::new(vec![
            Criterion::new("impact", 1.2, Normalizer::default()),
            Criterion::new("effort", -0.2, Normalizer::default()),
        ])
        .unwrap();

        let cheap = candidate("cheap", &[("impact", 8.0), ("effort", 1.0)]);
        let costly = candidate("costly", &[("impact", 8.0), ("effort", 9.0)]);
        assert!((score(&cheap, &table) - (1.2 * 0.8 - 0.2 * 0.1)).abs() < 1e-12);
        assert!(score(&cheap, &table) > score(&costly, &table));
    }

    #[test]
    fn test_score_never_panics_on_odd_input() {
        let table = WeightTable::default();
        let odd = candidate(
            "odd",
            &[("impact", f64::NAN), ("urgency", f64::NEG_INFINITY), ("effort", 1e300)],
        );
        let value = score(&odd, &table);
        assert!(value.is_finite());
        assert!((-0.1..=1.0).contains(&value));
    }

    #[test]
    fn test_unlocks_criterion_counts_set() {
        let table = WeightTable::new(vec![Criterion::new(
            "unlocks",
            1.0,
            Normalizer::Count { cap: 4.0 },
        )])
        .unwrap();
        let mut c = candidate("a", &[]);
        c.unlocks.insert("b".into());
        c.unlocks.insert("c".into());
        assert_eq!(score(&c, &table), 0.5);
    }

    #[test]
    fn test_score_all_replaces_stale_scores() {
        let table = WeightTable::default();
        let mut candidates = vec![candidate("a", &[("impact", 10.0)])];
        candidates[0].score = Some(99.0);
        score_all(&mut candidates, &table);
        assert!((candidates[0].score.unwrap() - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_tie_breaks_by_effort_then_id() {
        let mut a = candidate("b-item", &[]);
        a.score = Some(0.5);
        a.effort = 3.0;
        let mut b = candidate("a-item", &[]);
        b.score = Some(0.5 + 1e-12);
        b.effort = 3.0;
        let mut c = candidate("c-item", &[]);
        c.score = Some(0.5);
        c.effort = 1.0;

        let mut ranked = vec![a, b, c];
        ranked.sort_by(compare_ranked);
        let ids: Vec<_> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c-item", "a-item", "b-item"]);
    }
}
