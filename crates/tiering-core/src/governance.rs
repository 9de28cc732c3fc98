//! Budget governance over cost summaries

use crate::models::{CostSummary, PolicySelector, ResourceMetric};
use serde::{Deserialize, Serialize};

/// Default share of the budget at which an alert is raised
pub const DEFAULT_ALERT_THRESHOLD_PERCENT: f64 = 80.0;

/// A monthly budget for the resources a selector picks out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostPolicy {
    pub name: String,
    pub budget: f64,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold_percent: f64,
    #[serde(default)]
    pub selector: PolicySelector,
}

fn default_alert_threshold() -> f64 {
    DEFAULT_ALERT_THRESHOLD_PERCENT
}

impl CostPolicy {
    pub fn new(name: impl Into<String>, budget: f64, selector: PolicySelector) -> Self {
        Self {
            name: name.into(),
            budget,
            alert_threshold_percent: DEFAULT_ALERT_THRESHOLD_PERCENT,
            selector,
        }
    }

    /// Spend of the selected resources; expects costs to be stamped already
    pub fn spend(&self, resources: &[ResourceMetric]) -> f64 {
        resources
            .iter()
            .filter(|r| self.selector.matches(r))
            .map(|r| r.monthly_cost)
            .sum()
    }

    /// Alert text if spend is over budget or past the alert threshold
    pub fn check(&self, spend: f64) -> Option<String> {
        if self.budget <= 0.0 {
            return None;
        }

        let percent = spend / self.budget * 100.0;
        if spend > self.budget {
            Some(format!(
                "Budget exceeded for {}: ${:.2} of ${:.2} ({:.0}%)",
                self.name, spend, self.budget, percent
            ))
        } else if percent >= self.alert_threshold_percent {
            Some(format!(
                "Budget approaching for {}: ${:.2} of ${:.2} ({:.0}%)",
                self.name, spend, self.budget, percent
            ))
        } else {
            None
        }
    }
}

/// Set the budget limit on the summary and append one alert per policy in breach
pub fn apply_budgets(summary: &mut CostSummary, resources: &[ResourceMetric], policies: &[CostPolicy]) {
    summary.budget_limit = policies.iter().map(|p| p.budget).sum();

    for policy in policies {
        if let Some(alert) = policy.check(policy.spend(resources)) {
            summary.active_alerts.push(alert);
        }
    }
}
