//! Anomaly signals over usage and cost history
//!
//! - Zombie pattern: utilization stayed near zero across the whole history
//! - Cost spike: current spend jumped well above its recent average

use serde::{Deserialize, Serialize};

/// Utilization at or below which a sample counts as idle (5%)
pub const DEFAULT_IDLE_UTILIZATION: f64 = 0.05;

/// Spend above this multiple of the average is a spike
pub const DEFAULT_SPIKE_MULTIPLIER: f64 = 3.0;

/// Detects resources whose utilization never rose above an idle threshold
#[derive(Debug, Clone)]
pub struct ZombiePatternDetector {
    pub idle_utilization: f64,
}

impl ZombiePatternDetector {
    pub fn new(idle_utilization: f64) -> Self {
        Self { idle_utilization }
    }

    /// An empty history is never a zombie pattern
    pub fn is_zombie_pattern(&self, utilization_history: &[f64]) -> bool {
        !utilization_history.is_empty()
            && utilization_history
                .iter()
                .all(|util| *util <= self.idle_utilization)
    }
}

impl Default for ZombiePatternDetector {
    fn default() -> Self {
        Self::new(DEFAULT_IDLE_UTILIZATION)
    }
}

/// A detected spend spike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostSpike {
    pub current_cost: f64,
    pub average_cost: f64,
    pub ratio: f64,
}

impl CostSpike {
    pub fn describe(&self) -> String {
        format!(
            "Cost spike: ${:.2}/mo is {:.1}x the recent average of ${:.2}/mo",
            self.current_cost, self.ratio, self.average_cost
        )
    }
}

/// Flags spend that exceeds a multiple of its recent average
#[derive(Debug, Clone)]
pub struct CostSpikeDetector {
    pub multiplier: f64,
}

impl CostSpikeDetector {
    pub fn new(multiplier: f64) -> Self {
        Self { multiplier }
    }

    pub fn detect(&self, current_cost: f64, average_cost: f64) -> Option<CostSpike> {
        if average_cost <= 0.0 {
            return None;
        }
        if current_cost > average_cost * self.multiplier {
            Some(CostSpike {
                current_cost,
                average_cost,
                ratio: current_cost / average_cost,
            })
        } else {
            None
        }
    }

    /// Compare the latest sample against the mean of the ones before it
    pub fn detect_in_series(&self, series: &[f64]) -> Option<CostSpike> {
        let (current, previous) = series.split_last()?;
        if previous.is_empty() {
            return None;
        }
        let average = previous.iter().sum::<f64>() / previous.len() as f64;
        self.detect(*current, average)
    }
}

impl Default for CostSpikeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SPIKE_MULTIPLIER)
    }
}
