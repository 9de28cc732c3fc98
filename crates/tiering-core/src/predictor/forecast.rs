//! Linear trend cost forecaster

use super::{linear_regression_slope, ForecastOracle};

/// Extrapolates the growth series one step and applies it to the current cost.
///
/// next growth = last growth + slope of the growth series. With no samples the
/// forecast equals the current cost. Predictions never go below zero.
#[derive(Debug, Clone, Default)]
pub struct LinearTrendForecaster {
    /// Only the most recent samples are considered (0 = all)
    window: usize,
}

impl LinearTrendForecaster {
    pub fn new() -> Self {
        Self { window: 0 }
    }

    pub fn with_window(window: usize) -> Self {
        Self { window }
    }

    fn next_growth(&self, trend: &[f64]) -> f64 {
        let samples = if self.window > 0 && trend.len() > self.window {
            &trend[trend.len() - self.window..]
        } else {
            trend
        };

        match samples.last() {
            Some(last) => last + linear_regression_slope(samples),
            None => 0.0,
        }
    }
}

impl ForecastOracle for LinearTrendForecaster {
    fn forecast_next_period(&self, current_cost: f64, trend: &[f64]) -> f64 {
        let growth = self.next_growth(trend).max(-1.0);
        (current_cost * (1.0 + growth)).max(0.0)
    }
}
