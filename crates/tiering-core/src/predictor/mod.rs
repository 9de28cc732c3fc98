//! Forecast and placement oracles
//!
//! The optimizer and the lifecycle recommender consult these through trait
//! objects so alternative models can be plugged in without touching them.

mod forecast;
mod placement;

pub use forecast::LinearTrendForecaster;
pub use placement::{ScoredPlacement, DEFAULT_LEARNING_RATE};

use crate::models::ResourceMetric;
use std::collections::HashMap;
use std::fmt;

/// Egress above which a workload counts as egress-heavy (100 MiB)
pub const HIGH_EGRESS_BYTES: u64 = 100 * 1024 * 1024;

/// Period-over-period growth samples keyed by resource identity
pub type TrendSamples = HashMap<String, Vec<f64>>;

/// Predicts next-period cost from the current cost and a growth trend
pub trait ForecastOracle: Send + Sync {
    fn forecast_next_period(&self, current_cost: f64, trend: &[f64]) -> f64;
}

/// Suggests a storage class for a workload profile and learns from feedback
pub trait PlacementOracle: Send + Sync {
    /// Pick one of `candidates`; `None` when there is nothing to choose from
    fn suggest_placement(&self, profile: WorkloadProfile, candidates: &[String]) -> Option<String>;

    /// Feed back how well a placement worked out
    fn reward(&self, profile: WorkloadProfile, class: &str, score: f64);
}

/// Coarse workload shape used as placement state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadProfile {
    Standard,
    HighEgress,
}

impl WorkloadProfile {
    pub fn of(resource: &ResourceMetric) -> Self {
        if resource.egress_bytes > HIGH_EGRESS_BYTES {
            WorkloadProfile::HighEgress
        } else {
            WorkloadProfile::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadProfile::Standard => "standard",
            WorkloadProfile::HighEgress => "high-egress",
        }
    }
}

impl fmt::Display for WorkloadProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Growth rates between consecutive cost samples; zero-cost samples are skipped
pub fn growth_rates(costs: &[f64]) -> Vec<f64> {
    costs
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Least-squares slope of `values` against their index
pub fn linear_regression_slope(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let sum_x: f64 = (0..values.len()).map(|i| i as f64).sum();
    let sum_y: f64 = values.iter().sum();
    let sum_xy: f64 = values.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let sum_x2: f64 = (0..values.len()).map(|i| (i as f64).powi(2)).sum();
    let denom = n * sum_x2 - sum_x.powi(2);
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denom
}
