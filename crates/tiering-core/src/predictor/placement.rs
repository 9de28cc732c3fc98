//! Score-table placement policy
//!
//! Keeps a value per (workload profile, storage class). Suggestions are greedy
//! over the candidate list; rewards nudge the stored value toward the observed
//! score. There is no random exploration, so suggestions are reproducible.

use super::{PlacementOracle, WorkloadProfile};
use dashmap::DashMap;
use tracing::debug;

/// Step size for reward updates
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;

pub struct ScoredPlacement {
    scores: DashMap<(WorkloadProfile, String), f64>,
    learning_rate: f64,
}

impl ScoredPlacement {
    pub fn new() -> Self {
        Self {
            scores: DashMap::new(),
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }

    /// Seeded with a preference for each provider's general-purpose SSD on
    /// every profile
    pub fn with_defaults() -> Self {
        let mut placement = Self::new();
        for profile in [WorkloadProfile::Standard, WorkloadProfile::HighEgress] {
            for class in ["gp3", "pd-balanced", "standard-ssd"] {
                placement = placement.with_preference(profile, class, 1.0);
            }
        }
        placement
    }

    pub fn with_learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_preference(self, profile: WorkloadProfile, class: &str, score: f64) -> Self {
        self.scores.insert((profile, class.to_string()), score);
        self
    }

    pub fn score(&self, profile: WorkloadProfile, class: &str) -> f64 {
        self.scores
            .get(&(profile, class.to_string()))
            .map(|v| *v)
            .unwrap_or(0.0)
    }
}

impl Default for ScoredPlacement {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PlacementOracle for ScoredPlacement {
    fn suggest_placement(&self, profile: WorkloadProfile, candidates: &[String]) -> Option<String> {
        let mut best: Option<(&String, f64)> = None;
        for class in candidates {
            let score = self.score(profile, class);
            // strictly greater keeps the first candidate on ties
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((class, score));
            }
        }
        best.map(|(class, _)| class.clone())
    }

    fn reward(&self, profile: WorkloadProfile, class: &str, score: f64) {
        let mut entry = self.scores.entry((profile, class.to_string())).or_insert(0.0);
        let old = *entry;
        *entry = old + self.learning_rate * (score - old);
        debug!(
            profile = %profile,
            class = %class,
            old_value = old,
            new_value = *entry,
            "Placement score updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_candidates() {
        let p = ScoredPlacement::new();
        assert!(p.suggest_placement(WorkloadProfile::Standard, &[]).is_none());
    }

    #[test]
    fn test_ties_pick_first_candidate() {
        let p = ScoredPlacement::new();
        let pick = p.suggest_placement(WorkloadProfile::Standard, &classes(&["sc1", "st1"]));
        assert_eq!(pick.as_deref(), Some("sc1"));
    }

    #[test]
    fn test_defaults_prefer_gp3() {
        let p = ScoredPlacement::with_defaults();
        let pick = p.suggest_placement(WorkloadProfile::Standard, &classes(&["sc1", "gp3", "st1"]));
        assert_eq!(pick.as_deref(), Some("gp3"));

        let pick = p.suggest_placement(
            WorkloadProfile::HighEgress,
            &classes(&["pd-standard", "pd-balanced"]),
        );
        assert_eq!(pick.as_deref(), Some("pd-balanced"));
    }

    #[test]
    fn test_reward_moves_toward_score() {
        let p = ScoredPlacement::new();
        p.reward(WorkloadProfile::HighEgress, "st1", 10.0);
        assert!((p.score(WorkloadProfile::HighEgress, "st1") - 1.0).abs() < 1e-9);

        let pick = p.suggest_placement(WorkloadProfile::HighEgress, &classes(&["sc1", "st1"]));
        assert_eq!(pick.as_deref(), Some("st1"));

        // other profiles are unaffected
        let pick = p.suggest_placement(WorkloadProfile::Standard, &classes(&["sc1", "st1"]));
        assert_eq!(pick.as_deref(), Some("sc1"));
    }
}
