//! Savings detectors and recommendation ranking
//!
//! Each resource runs through a fixed battery of independent detectors:
//! zombie, storage class, cross-provider, right-sizing (forecast-augmented)
//! and learned placement. Findings are merged and sorted by monthly savings,
//! highest first.

use super::calculator::CostEngine;
use super::{format_cost, format_cost_per_month};
use crate::models::{Impact, Recommendation, RecommendationType, ResourceMetric};
use crate::predictor::{ForecastOracle, PlacementOracle, TrendSamples, WorkloadProfile};
use crate::pricing::{resolve_class, Provider};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Alternate location evaluated by the cross-provider detector
#[derive(Debug, Clone, PartialEq)]
pub struct CrossProviderTarget {
    pub provider: Provider,
    pub region: String,
    pub storage_class: String,
}

impl Default for CrossProviderTarget {
    fn default() -> Self {
        Self {
            provider: Provider::Gcp,
            region: "us-central1".to_string(),
            storage_class: "pd-standard".to_string(),
        }
    }
}

/// Thresholds for every detector
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Days since last access before a resource is a deletion candidate
    pub zombie_after_days: f64,
    /// Class changes saving less than this per month are dropped
    pub min_class_change_savings: f64,
    /// Moving to a cold class above this IOPS is medium impact
    pub cold_tier_impact_iops: f64,
    /// Moving to a balanced class above this IOPS is medium impact
    pub balanced_tier_impact_iops: f64,
    /// Only volumes larger than this (GiB) are right-sized
    pub oversize_floor_gib: f64,
    /// Utilization (%) below which a volume is oversized
    pub oversize_utilization_percent: f64,
    /// New size = used * headroom
    pub resize_headroom: f64,
    /// Smallest size ever proposed (GiB)
    pub min_resize_gib: f64,
    /// Predicted growth beyond this fraction escalates right-sizing
    pub forecast_growth_threshold: f64,
    /// `None` disables the cross-provider detector
    pub cross_provider: Option<CrossProviderTarget>,
    pub cross_provider_cost_floor: f64,
    pub cross_provider_min_savings: f64,
    /// Months of savings that must cover the one-time transfer cost
    pub payback_months: f64,
    /// Classes the placement oracle chooses from
    pub placement_candidates: Vec<String>,
    /// Classes considered legacy and offered to the placement oracle
    pub legacy_classes: Vec<String>,
    pub placement_confidence: f64,
    /// Low-impact findings saving more than this are quick wins
    pub quick_win_floor: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            zombie_after_days: 30.0,
            min_class_change_savings: 0.50,
            cold_tier_impact_iops: 100.0,
            balanced_tier_impact_iops: 2000.0,
            oversize_floor_gib: 50.0,
            oversize_utilization_percent: 20.0,
            resize_headroom: 1.5,
            min_resize_gib: 10.0,
            forecast_growth_threshold: 0.20,
            cross_provider: Some(CrossProviderTarget::default()),
            cross_provider_cost_floor: 50.0,
            cross_provider_min_savings: 10.0,
            payback_months: 3.0,
            placement_candidates: vec!["gp3".to_string(), "sc1".to_string(), "st1".to_string()],
            legacy_classes: vec!["gp2".to_string()],
            placement_confidence: 0.5,
            quick_win_floor: 5.0,
        }
    }
}

/// Generates ranked optimization recommendations
pub struct Optimizer {
    engine: CostEngine,
    forecaster: Arc<dyn ForecastOracle>,
    placement: Arc<dyn PlacementOracle>,
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(
        engine: CostEngine,
        forecaster: Arc<dyn ForecastOracle>,
        placement: Arc<dyn PlacementOracle>,
    ) -> Self {
        Self {
            engine,
            forecaster,
            placement,
            config: OptimizerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn engine(&self) -> &CostEngine {
        &self.engine
    }

    pub fn generate_recommendations(
        &self,
        resources: &[ResourceMetric],
        provider: Provider,
    ) -> Vec<Recommendation> {
        self.generate_with_trends(resources, provider, &TrendSamples::new(), Utc::now())
    }

    /// Run every detector over every resource, then sort by savings descending
    pub fn generate_with_trends(
        &self,
        resources: &[ResourceMetric],
        provider: Provider,
        trends: &TrendSamples,
        now: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        for resource in resources {
            let current_cost = self.engine.monthly_cost(resource, provider);
            let trend = trends
                .get(&resource.key())
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            recommendations.extend(self.check_zombie(resource, current_cost, now));
            recommendations.extend(self.check_storage_class(resource, provider));
            recommendations.extend(self.check_cross_provider(resource, current_cost));
            recommendations.extend(self.check_oversized_with_forecast(resource, current_cost, trend));
            recommendations.extend(self.check_learned_placement(resource, provider));
        }

        recommendations.sort_by(|a, b| b.monthly_savings.total_cmp(&a.monthly_savings));

        debug!(
            resources = resources.len(),
            recommendations = recommendations.len(),
            "Optimization pass complete"
        );

        recommendations
    }

    fn check_zombie(
        &self,
        resource: &ResourceMetric,
        current_cost: f64,
        now: DateTime<Utc>,
    ) -> Option<Recommendation> {
        let days = resource.days_since_access_at(now)?;
        if days <= self.config.zombie_after_days {
            return None;
        }

        Some(Recommendation {
            kind: RecommendationType::DeleteZombie,
            resource: resource.name.clone(),
            namespace: resource.namespace.clone(),
            current_state: format!("Unused for {:.0} days", days),
            recommended_state: "Delete volume".to_string(),
            monthly_savings: current_cost,
            reasoning: format!(
                "Volume has not been accessed in {:.0} days. Consider backing up and deleting.",
                days
            ),
            impact: Impact::Low,
        })
    }

    fn check_storage_class(
        &self,
        resource: &ResourceMetric,
        provider: Provider,
    ) -> Option<Recommendation> {
        let (provider, base) = resolve_class(
            CostEngine::effective_provider(resource, provider),
            &resource.storage_class,
        );
        let iops = resource.total_iops();
        let (target, reasoning) = class_change_target(provider, base, iops)?;

        let savings = self.engine.estimate_savings(resource, provider, target);
        if savings <= self.config.min_class_change_savings {
            return None;
        }

        Some(Recommendation {
            kind: RecommendationType::StorageClassChange,
            resource: resource.name.clone(),
            namespace: resource.namespace.clone(),
            current_state: resource.storage_class.clone(),
            recommended_state: target.to_string(),
            monthly_savings: savings,
            reasoning,
            impact: self.class_change_impact(iops, target),
        })
    }

    fn class_change_impact(&self, iops: f64, target: &str) -> Impact {
        match target {
            "sc1" | "st1" | "pd-standard" if iops > self.config.cold_tier_impact_iops => {
                Impact::Medium
            }
            "gp3" | "pd-balanced" | "standard" if iops > self.config.balanced_tier_impact_iops => {
                Impact::Medium
            }
            _ => Impact::Low,
        }
    }

    fn check_cross_provider(
        &self,
        resource: &ResourceMetric,
        current_cost: f64,
    ) -> Option<Recommendation> {
        let target = self.config.cross_provider.as_ref()?;
        let src_provider = resource.provider.as_deref()?;
        let src_region = resource.region.as_deref()?;

        if current_cost <= self.config.cross_provider_cost_floor
            || src_provider.eq_ignore_ascii_case(target.provider.as_str())
        {
            return None;
        }

        let alt_pricing =
            self.engine
                .pricing()
                .get_price(target.provider, &target.storage_class, &target.region);
        let monthly_savings = current_cost - CostEngine::cost_under(resource, &alt_pricing);
        if monthly_savings <= self.config.cross_provider_min_savings {
            return None;
        }

        let egress = self.engine.estimate_egress_cost(
            resource.capacity_bytes,
            src_provider,
            src_region,
            target.provider.as_str(),
            &target.region,
        );
        if monthly_savings * self.config.payback_months <= egress {
            return None;
        }

        Some(Recommendation {
            kind: RecommendationType::CrossCloudMove,
            resource: resource.name.clone(),
            namespace: resource.namespace.clone(),
            current_state: format!("{} ({})", src_provider, src_region),
            recommended_state: format!("{} ({})", target.provider, target.region),
            monthly_savings,
            reasoning: format!(
                "Cross-cloud migration saves {}. One-time transfer cost ({}) recouped in {:.1} months.",
                format_cost_per_month(monthly_savings),
                format_cost(egress),
                egress / monthly_savings
            ),
            impact: Impact::High,
        })
    }

    /// Right-sizing, escalated when the forecast predicts strong growth
    fn check_oversized_with_forecast(
        &self,
        resource: &ResourceMetric,
        current_cost: f64,
        trend: &[f64],
    ) -> Option<Recommendation> {
        let predicted = self.forecaster.forecast_next_period(current_cost, trend);
        let growing = predicted > current_cost * (1.0 + self.config.forecast_growth_threshold);

        let mut rec = self.check_oversized(resource, current_cost)?;
        if growing {
            let growth_pct = (predicted / current_cost - 1.0) * 100.0;
            rec.reasoning = format!(
                "[forecast] {} (predicted growth: +{:.0}%)",
                rec.reasoning, growth_pct
            );
            rec.impact = Impact::High;
        }
        Some(rec)
    }

    fn check_oversized(
        &self,
        resource: &ResourceMetric,
        current_cost: f64,
    ) -> Option<Recommendation> {
        if !resource.has_usage() {
            return None;
        }

        let size_gib = resource.capacity_gib();
        let utilization = resource.usage_percent();
        if size_gib <= self.config.oversize_floor_gib
            || utilization >= self.config.oversize_utilization_percent
        {
            return None;
        }

        let new_size_gib =
            (resource.used_gib() * self.config.resize_headroom).max(self.config.min_resize_gib);
        let new_cost = current_cost * (new_size_gib / size_gib);

        Some(Recommendation {
            kind: RecommendationType::Resize,
            resource: resource.name.clone(),
            namespace: resource.namespace.clone(),
            current_state: format!("{:.0}GB ({:.1}% used)", size_gib, utilization),
            recommended_state: format!("{:.0}GB", new_size_gib),
            monthly_savings: current_cost - new_cost,
            reasoning: format!(
                "Volume is only {:.1}% utilized. Consider resizing to {:.0}GB.",
                utilization, new_size_gib
            ),
            impact: Impact::Medium,
        })
    }

    /// Exploratory: emitted whenever the oracle disagrees, regardless of savings
    fn check_learned_placement(
        &self,
        resource: &ResourceMetric,
        provider: Provider,
    ) -> Option<Recommendation> {
        let (provider, base) = resolve_class(
            CostEngine::effective_provider(resource, provider),
            &resource.storage_class,
        );
        if !self.config.legacy_classes.iter().any(|c| c == base) {
            return None;
        }

        let profile = WorkloadProfile::of(resource);
        let suggested = self
            .placement
            .suggest_placement(profile, &self.config.placement_candidates)?;
        if suggested == base {
            return None;
        }

        let savings = self
            .engine
            .estimate_savings(resource, provider, &suggested)
            .max(0.0);

        Some(Recommendation {
            kind: RecommendationType::AiPlacement,
            resource: resource.name.clone(),
            namespace: resource.namespace.clone(),
            current_state: resource.storage_class.clone(),
            recommended_state: suggested,
            monthly_savings: savings,
            reasoning: format!(
                "[learned placement] Preferred class for {} workloads (confidence {:.2}).",
                profile, self.config.placement_confidence
            ),
            impact: Impact::Low,
        })
    }

    pub fn filter_by_type(
        &self,
        recommendations: &[Recommendation],
        kind: RecommendationType,
    ) -> Vec<Recommendation> {
        recommendations
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }

    pub fn filter_by_impact(
        &self,
        recommendations: &[Recommendation],
        impact: Impact,
    ) -> Vec<Recommendation> {
        recommendations
            .iter()
            .filter(|r| r.impact == impact)
            .cloned()
            .collect()
    }

    pub fn calculate_total_savings(&self, recommendations: &[Recommendation]) -> f64 {
        recommendations.iter().map(|r| r.monthly_savings).sum()
    }

    /// Low-impact findings worth more than the quick-win floor
    pub fn quick_wins(&self, recommendations: &[Recommendation]) -> Vec<Recommendation> {
        recommendations
            .iter()
            .filter(|r| r.impact == Impact::Low && r.monthly_savings > self.config.quick_win_floor)
            .cloned()
            .collect()
    }
}

/// Provider-specific class downgrade table keyed by normalized class and IOPS
fn class_change_target(
    provider: Provider,
    base_class: &str,
    iops: f64,
) -> Option<(&'static str, String)> {
    match (provider, base_class) {
        (Provider::Aws, "gp3" | "gp2") if iops < 500.0 => Some((
            "sc1",
            format!(
                "Low IOPS usage ({:.0}). Cold HDD storage is 70% cheaper for infrequently accessed data.",
                iops
            ),
        )),
        (Provider::Aws, "gp3" | "gp2") if iops < 1000.0 => Some((
            "st1",
            format!(
                "Low IOPS usage ({:.0}). Throughput-optimized HDD is 55% cheaper.",
                iops
            ),
        )),
        (Provider::Aws, "io1" | "io2") if iops < 3000.0 => Some((
            "gp3",
            format!(
                "IOPS usage ({:.0}) doesn't justify provisioned IOPS. gp3 provides 3,000 baseline IOPS.",
                iops
            ),
        )),
        (Provider::Gcp, "pd-ssd" | "ssd") if iops < 1000.0 => Some((
            "pd-balanced",
            format!(
                "Low IOPS usage ({:.0}). Balanced persistent disk is 41% cheaper.",
                iops
            ),
        )),
        (Provider::Gcp, "pd-balanced" | "balanced") if iops < 500.0 => Some((
            "pd-standard",
            format!(
                "Very low IOPS usage ({:.0}). Standard persistent disk is 60% cheaper.",
                iops
            ),
        )),
        (Provider::Azure, "premium" | "managed-premium") if iops < 1000.0 => Some((
            "standard",
            format!(
                "Low IOPS usage ({:.0}). Standard storage is 62% cheaper.",
                iops
            ),
        )),
        _ => None,
    }
}
