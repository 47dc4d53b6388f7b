//! Weighted random load balancing strategy.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use crate::load_balancer::{Candidate, LoadBalancer};

/// Pick an index given a draw `r` in `[0, Σweight]`.
///
/// Candidates are walked in order, accumulating positive weights; the first
/// one whose cumulative weight reaches `r` wins, so a draw that lands exactly
/// on a boundary goes to the earlier candidate. Zero-weight candidates are
/// never returned unless every weight is zero, in which case the first
/// candidate is returned.
pub fn pick_weighted(weights: &[f64], r: f64) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    if total_weight(weights) <= 0.0 {
        return Some(0);
    }

    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (index, &weight) in weights.iter().enumerate() {
        if weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last_positive = Some(index);
        if r <= cumulative {
            return Some(index);
        }
    }
    // float rounding can leave r a hair above the final cumulative sum
    last_positive
}

/// Sum of the positive weights.
pub fn total_weight(weights: &[f64]) -> f64 {
    weights.iter().filter(|w| **w > 0.0).sum()
}

/// Random selection biased by candidate weight.
#[derive(Debug)]
pub struct WeightedRandom {
    rng: Mutex<StdRng>,
}

impl WeightedRandom {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence of draws, for tests and reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for WeightedRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalancer for WeightedRandom {
    fn select(&self, candidates: &[Candidate<'_>]) -> Option<usize> {
        let weights: Vec<f64> = candidates.iter().map(|c| c.weight).collect();
        let total = total_weight(&weights);
        if total <= 0.0 {
            return pick_weighted(&weights, 0.0);
        }

        let r = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            rng.gen_range(0.0..=total)
        };
        pick_weighted(&weights, r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn candidates<'a>(ids: &'a [&'a str], weights: &[f64]) -> Vec<Candidate<'a>> {
        ids.iter()
            .zip(weights)
            .map(|(id, w)| Candidate { node_id: id, weight: *w })
            .collect()
    }

    #[test]
    fn test_boundaries_favor_earlier_candidate() {
        let weights = [1.0, 1.0, 1.0];
        assert_eq!(pick_weighted(&weights, 0.0), Some(0));
        assert_eq!(pick_weighted(&weights, 1.0), Some(0));
        assert_eq!(pick_weighted(&weights, 1.0001), Some(1));
        assert_eq!(pick_weighted(&weights, 3.0), Some(2));
    }

    #[test]
    fn test_zero_total_returns_first() {
        assert_eq!(pick_weighted(&[0.0, 0.0], 0.0), Some(0));
        assert_eq!(pick_weighted(&[], 0.0), None);
    }

    #[test]
    fn test_zero_draw_skips_leading_zero_weight() {
        assert_eq!(pick_weighted(&[0.0, 0.8, 1.2], 0.0), Some(1));
    }

    #[test]
    fn test_selection_biased_by_weight() {
        let lb = WeightedRandom::with_seed(7);
        let ids = ["r1", "r2"];
        let cands = candidates(&ids, &[1.2, 0.8]);

        let mut hits = [0usize; 2];
        for _ in 0..10_000 {
            hits[lb.select(&cands).unwrap()] += 1;
        }
        // expected split 60/40
        let share = hits[0] as f64 / 10_000.0;
        assert!((0.55..0.65).contains(&share), "share was {share}");
    }

    #[test]
    fn test_empty_candidates() {
        assert_eq!(WeightedRandom::with_seed(1).select(&[]), None);
    }

    proptest! {
        #[test]
        fn prop_never_picks_zero_weight(
            weights in prop::collection::vec(prop_oneof![Just(0.0), 0.1f64..2.0], 1..8),
            fraction in 0.0f64..=1.0,
        ) {
            let total = total_weight(&weights);
            prop_assume!(total > 0.0);
            let picked = pick_weighted(&weights, fraction * total).unwrap();
            prop_assert!(weights[picked] > 0.0);
        }
    }
}
