//! Monthly cost calculation and fleet summaries

use crate::models::{CostSummary, ResourceMetric, BYTES_PER_GIB, DEFAULT_CLUSTER};
use crate::pricing::{parse_provider, PricingOracle, Provider, StoragePricing};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// IOPS included with every volume; only the excess is charged
pub const BASELINE_IOPS: f64 = 3000.0;

/// Hours used to derive hourly cost from monthly cost
pub const HOURS_PER_MONTH: f64 = 24.0 * 30.0;

/// Size of the most-expensive list in summaries
pub const DEFAULT_TOP_N: usize = 10;

/// Region assumed when a resource does not report one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Transfer price between regions of one provider
pub const INTER_REGION_EGRESS_PER_GIB: f64 = 0.02;

/// Transfer price when leaving a provider
pub const CROSS_PROVIDER_EGRESS_PER_GIB: f64 = 0.09;

/// Prices resources against a pricing oracle
#[derive(Clone)]
pub struct CostEngine {
    pricing: Arc<dyn PricingOracle>,
    top_n: usize,
}

impl CostEngine {
    pub fn new(pricing: Arc<dyn PricingOracle>) -> Self {
        Self {
            pricing,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn pricing(&self) -> &dyn PricingOracle {
        self.pricing.as_ref()
    }

    /// Fleet provider, or the resource's own provider when the fleet's is unknown
    pub fn effective_provider(resource: &ResourceMetric, provider: Provider) -> Provider {
        match provider {
            Provider::Unknown => resource
                .provider
                .as_deref()
                .map(parse_provider)
                .unwrap_or(Provider::Unknown),
            known => known,
        }
    }

    pub fn price_of(&self, resource: &ResourceMetric, provider: Provider) -> StoragePricing {
        let provider = Self::effective_provider(resource, provider);
        let region = resource.region.as_deref().unwrap_or(DEFAULT_REGION);
        self.pricing
            .get_price(provider, &resource.storage_class, region)
    }

    /// Cost of a resource under the given pricing, without side effects
    pub fn cost_under(resource: &ResourceMetric, pricing: &StoragePricing) -> f64 {
        let storage = resource.capacity_gib() * pricing.per_unit_month;
        let iops = if pricing.provisioned_iops {
            (resource.total_iops() - BASELINE_IOPS).max(0.0) * pricing.per_iops
        } else {
            0.0
        };
        storage + iops
    }

    pub fn monthly_cost(&self, resource: &ResourceMetric, provider: Provider) -> f64 {
        Self::cost_under(resource, &self.price_of(resource, provider))
    }

    /// Compute the monthly cost and stamp it onto the resource
    pub fn calculate_cost(&self, resource: &mut ResourceMetric, provider: Provider) -> f64 {
        let cost = self.monthly_cost(resource, provider);
        resource.monthly_cost = cost;
        cost
    }

    pub fn summarize(&self, resources: &mut [ResourceMetric], provider: Provider) -> CostSummary {
        self.summarize_at(resources, provider, Utc::now())
    }

    /// Price every resource and aggregate the fleet in a single pass.
    ///
    /// Only the top-N most expensive are ordered, by repeatedly selecting the
    /// largest remaining entry. The caller's slice order is left intact.
    pub fn summarize_at(
        &self,
        resources: &mut [ResourceMetric],
        provider: Provider,
        now: DateTime<Utc>,
    ) -> CostSummary {
        let mut summary = CostSummary::default();

        for resource in resources.iter_mut() {
            let cost = self.calculate_cost(resource, provider);
            resource.hourly_cost = cost / HOURS_PER_MONTH;

            summary.total_monthly_cost += cost;
            *summary
                .by_namespace
                .entry(resource.namespace.clone())
                .or_default() += cost;
            *summary
                .by_storage_class
                .entry(resource.storage_class.clone())
                .or_default() += cost;

            let provider_label = resource
                .provider
                .clone()
                .unwrap_or_else(|| provider.as_str().to_string());
            *summary.by_provider.entry(provider_label).or_default() += cost;

            let cluster_label = resource
                .cluster_id
                .clone()
                .unwrap_or_else(|| DEFAULT_CLUSTER.to_string());
            *summary.by_cluster.entry(cluster_label).or_default() += cost;

            if resource.is_zombie_at(now) {
                summary.zombies.push(resource.clone());
            }
        }

        let mut order: Vec<usize> = (0..resources.len()).collect();
        let top = self.top_n.min(order.len());
        for i in 0..top {
            let mut max_idx = i;
            for j in (i + 1)..order.len() {
                if resources[order[j]].monthly_cost > resources[order[max_idx]].monthly_cost {
                    max_idx = j;
                }
            }
            order.swap(i, max_idx);
            summary.top_expensive.push(resources[order[i]].clone());
        }

        summary
    }

    /// Monthly savings from moving to `target_class` at the same size and IOPS
    pub fn estimate_savings(
        &self,
        resource: &ResourceMetric,
        provider: Provider,
        target_class: &str,
    ) -> f64 {
        let current = self.monthly_cost(resource, provider);

        let mut candidate = resource.clone();
        candidate.storage_class = target_class.to_string();
        let target = self.monthly_cost(&candidate, provider);

        current - target
    }

    /// One-time cost of moving `bytes` between two locations
    pub fn estimate_egress_cost(
        &self,
        bytes: u64,
        src_provider: &str,
        src_region: &str,
        dst_provider: &str,
        dst_region: &str,
    ) -> f64 {
        let gib = bytes as f64 / BYTES_PER_GIB as f64;

        if src_provider == dst_provider && src_region == dst_region {
            0.0
        } else if src_provider == dst_provider {
            gib * INTER_REGION_EGRESS_PER_GIB
        } else {
            gib * CROSS_PROVIDER_EGRESS_PER_GIB
        }
    }
}
