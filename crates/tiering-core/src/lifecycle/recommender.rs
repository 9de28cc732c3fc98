//! Findings-based target selection for the lifecycle controller
//!
//! Tried in order: right-sizing, zombie pattern, learned placement. The first
//! that applies wins; otherwise the controller falls back to policy tiers.

use crate::anomaly::ZombiePatternDetector;
use crate::cost::format_quantity;
use crate::models::{OptimizationRecommendation, Policy, ResourceMetric, BYTES_PER_GIB};
use crate::predictor::{PlacementOracle, WorkloadProfile};
use crate::pricing::{normalize_storage_class, parse_provider, resolve_class, Provider};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Historical utilization ratios (0.0..=1.0), oldest first
#[async_trait]
pub trait UsageHistorySource: Send + Sync {
    async fn utilization_history(&self, resource: &ResourceMetric) -> Result<Vec<f64>>;
}

#[derive(Debug, Clone)]
pub struct RecommenderConfig {
    /// Utilization below which a volume is over-provisioned
    pub rightsize_utilization: f64,
    /// Only volumes larger than this are right-sized
    pub rightsize_floor_bytes: u64,
    pub resize_headroom: f64,
    pub min_size_bytes: u64,
    /// Latest utilization below which the zombie pattern is checked
    pub zombie_utilization: f64,
    pub zombie_confidence: f64,
    pub default_confidence: f64,
    /// Classes the placement oracle chooses from, per provider
    pub placement_candidates: HashMap<Provider, Vec<String>>,
    /// Provider assumed for resources that do not name one
    pub fleet_provider: Provider,
}

fn classes(names: &[&str]) -> Vec<String> {
    names.iter().map(|c| c.to_string()).collect()
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            rightsize_utilization: 0.30,
            rightsize_floor_bytes: 10 * BYTES_PER_GIB,
            resize_headroom: 1.5,
            min_size_bytes: BYTES_PER_GIB,
            zombie_utilization: 0.05,
            zombie_confidence: 0.95,
            default_confidence: 0.85,
            placement_candidates: HashMap::from([
                (Provider::Aws, classes(&["gp3", "sc1", "st1", "io2"])),
                (Provider::Gcp, classes(&["pd-balanced", "pd-standard", "pd-ssd"])),
                (
                    Provider::Azure,
                    classes(&["standard-ssd", "standard-hdd", "premium"]),
                ),
            ]),
            fleet_provider: Provider::Aws,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalKind {
    RightSize,
    ZombiePattern,
    Placement,
    PolicyTier,
}

impl ProposalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalKind::RightSize => "right_size",
            ProposalKind::ZombiePattern => "zombie_pattern",
            ProposalKind::Placement => "placement",
            ProposalKind::PolicyTier => "policy_tier",
        }
    }
}

impl fmt::Display for ProposalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A target state plus where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    pub kind: ProposalKind,
    pub recommendation: OptimizationRecommendation,
}

pub struct IntelligentRecommender {
    placement: Arc<dyn PlacementOracle>,
    history: Option<Arc<dyn UsageHistorySource>>,
    zombie: ZombiePatternDetector,
    config: RecommenderConfig,
}

impl IntelligentRecommender {
    pub fn new(placement: Arc<dyn PlacementOracle>) -> Self {
        Self {
            placement,
            history: None,
            zombie: ZombiePatternDetector::default(),
            config: RecommenderConfig::default(),
        }
    }

    pub fn with_history(mut self, history: Arc<dyn UsageHistorySource>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_config(mut self, config: RecommenderConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn recommend(&self, resource: &ResourceMetric, policy: &Policy) -> Option<Proposal> {
        if let Some(proposal) = self.right_size(resource) {
            return Some(proposal);
        }
        if let Some(proposal) = self.zombie_pattern(resource, policy).await {
            return Some(proposal);
        }
        self.placement(resource, policy)
    }

    /// Report how a placement worked out back to the oracle
    pub fn feedback(&self, resource: &ResourceMetric, class: &str, score: f64) {
        self.placement
            .reward(WorkloadProfile::of(resource), class, score);
    }

    fn right_size(&self, resource: &ResourceMetric) -> Option<Proposal> {
        if !resource.has_usage()
            || resource.capacity_bytes <= self.config.rightsize_floor_bytes
            || resource.usage_ratio() >= self.config.rightsize_utilization
        {
            return None;
        }

        let suggested = (resource.used_bytes as f64 * self.config.resize_headroom) as u64;
        let target = suggested.max(self.config.min_size_bytes);

        Some(Proposal {
            kind: ProposalKind::RightSize,
            recommendation: OptimizationRecommendation {
                target_class: resource.storage_class.clone(),
                target_tier: "hot".to_string(),
                target_size: format_quantity(target),
                reason: format!(
                    "Right-sizing: {:.0}% utilized, under the {:.0}% threshold",
                    resource.usage_percent(),
                    self.config.rightsize_utilization * 100.0
                ),
                confidence: self.config.default_confidence,
            },
        })
    }

    async fn zombie_pattern(&self, resource: &ResourceMetric, policy: &Policy) -> Option<Proposal> {
        let coldest = policy.tiers.last()?;
        if same_class(&coldest.storage_class, &resource.storage_class) {
            return None;
        }

        let mut history = Vec::new();
        if let Some(source) = &self.history {
            match source.utilization_history(resource).await {
                Ok(h) => history = h,
                Err(e) => debug!(
                    resource = %resource.key(),
                    error = %e,
                    "Usage history unavailable, using current sample"
                ),
            }
        }
        if history.is_empty() {
            if !resource.has_usage() {
                return None;
            }
            history.push(resource.usage_ratio());
        }

        let latest = *history.last()?;
        if latest >= self.config.zombie_utilization || !self.zombie.is_zombie_pattern(&history) {
            return None;
        }

        Some(Proposal {
            kind: ProposalKind::ZombiePattern,
            recommendation: OptimizationRecommendation {
                target_class: coldest.storage_class.clone(),
                target_tier: "cold".to_string(),
                target_size: format_quantity(resource.capacity_bytes),
                reason: format!(
                    "Zombie pattern: utilization stayed under {:.0}% across {} samples",
                    self.config.zombie_utilization * 100.0,
                    history.len()
                ),
                confidence: self.config.zombie_confidence,
            },
        })
    }

    /// Only for classes outside the policy's tier ladder, so placement never
    /// fights a tier transition
    fn placement(&self, resource: &ResourceMetric, policy: &Policy) -> Option<Proposal> {
        if policy
            .tiers
            .iter()
            .any(|t| same_class(&t.storage_class, &resource.storage_class))
        {
            return None;
        }

        let (provider, base) = self.resolve(resource);
        let candidates = self.config.placement_candidates.get(&provider)?;

        let profile = WorkloadProfile::of(resource);
        let suggested = self.placement.suggest_placement(profile, candidates)?;
        if suggested == base {
            return None;
        }

        Some(Proposal {
            kind: ProposalKind::Placement,
            recommendation: OptimizationRecommendation {
                target_class: suggested,
                target_tier: "warm".to_string(),
                target_size: format_quantity(resource.capacity_bytes),
                reason: format!(
                    "Placement: preferred {} class for {} workloads",
                    provider, profile
                ),
                confidence: self.config.default_confidence,
            },
        })
    }

    fn resolve<'a>(&self, resource: &'a ResourceMetric) -> (Provider, &'a str) {
        let provider = match resource.provider.as_deref().map(parse_provider) {
            Some(Provider::Unknown) | None => self.config.fleet_provider,
            Some(known) => known,
        };
        resolve_class(provider, &resource.storage_class)
    }
}

/// Compare classes ignoring a provider prefix
fn same_class(a: &str, b: &str) -> bool {
    normalize_storage_class(a).1 == normalize_storage_class(b).1
}
