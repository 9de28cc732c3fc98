//! Core data models for the tiering agent

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Bytes per capacity unit (GiB)
pub const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Days without access after which a resource counts as a zombie
pub const ZOMBIE_AFTER_DAYS: i64 = 30;

/// Label stamped with correlated egress bytes
pub const EGRESS_LABEL: &str = "tiering.io/egress-bytes";

/// Fallback cluster label used when a resource carries no cluster id
pub const DEFAULT_CLUSTER: &str = "default-cluster";

/// Storage resource observed during one collection cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceMetric {
    pub name: String,
    pub namespace: String,
    pub cluster_id: Option<String>,
    pub provider: Option<String>,
    pub region: Option<String>,

    pub storage_class: String,
    pub capacity_bytes: u64,
    /// Reported usage; may exceed capacity when telemetry is stale
    pub used_bytes: u64,
    pub read_iops: f64,
    pub write_iops: f64,
    pub egress_bytes: u64,

    /// Stamped by the cost engine
    pub monthly_cost: f64,
    pub hourly_cost: f64,

    /// Workloads that mount this resource
    #[serde(default)]
    pub mounted_by: Vec<String>,

    pub created_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl ResourceMetric {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        storage_class: impl Into<String>,
        capacity_bytes: u64,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            storage_class: storage_class.into(),
            capacity_bytes,
            ..Default::default()
        }
    }

    /// Stable identity used for cross-cycle bookkeeping
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}",
            self.cluster_id.as_deref().unwrap_or(DEFAULT_CLUSTER),
            self.namespace,
            self.name
        )
    }

    pub fn capacity_gib(&self) -> f64 {
        self.capacity_bytes as f64 / BYTES_PER_GIB as f64
    }

    pub fn used_gib(&self) -> f64 {
        self.used_bytes as f64 / BYTES_PER_GIB as f64
    }

    pub fn total_iops(&self) -> f64 {
        self.read_iops + self.write_iops
    }

    /// Whether usage telemetry was observed for this resource
    pub fn has_usage(&self) -> bool {
        self.used_bytes > 0
    }

    /// Used / capacity as a fraction, 0 when capacity is unknown
    pub fn usage_ratio(&self) -> f64 {
        if self.capacity_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.capacity_bytes as f64
    }

    pub fn usage_percent(&self) -> f64 {
        self.usage_ratio() * 100.0
    }

    pub fn annual_cost(&self) -> f64 {
        self.monthly_cost * 12.0
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.created_at.map(|created| now - created)
    }

    pub fn days_since_access_at(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_accessed_at
            .map(|accessed| (now - accessed).num_seconds() as f64 / 86_400.0)
    }

    /// A resource is a zombie only when its last access is known and old.
    pub fn is_zombie_at(&self, now: DateTime<Utc>) -> bool {
        match self.days_since_access_at(now) {
            Some(days) => days > ZOMBIE_AFTER_DAYS as f64,
            None => false,
        }
    }

    pub fn is_zombie(&self) -> bool {
        self.is_zombie_at(Utc::now())
    }
}

/// Kind of optimization finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    DeleteZombie,
    StorageClassChange,
    Resize,
    CrossCloudMove,
    AiPlacement,
}

impl RecommendationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::DeleteZombie => "delete_zombie",
            RecommendationType::StorageClassChange => "storage_class_change",
            RecommendationType::Resize => "resize",
            RecommendationType::CrossCloudMove => "cross_cloud_move",
            RecommendationType::AiPlacement => "ai_placement",
        }
    }
}

impl fmt::Display for RecommendationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational impact of acting on a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Impact::Low => write!(f, "low"),
            Impact::Medium => write!(f, "medium"),
            Impact::High => write!(f, "high"),
        }
    }
}

/// Optimization finding produced by one optimizer run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub resource: String,
    pub namespace: String,
    pub current_state: String,
    pub recommended_state: String,
    pub monthly_savings: f64,
    pub reasoning: String,
    pub impact: Impact,
}

impl Recommendation {
    pub fn is_actionable(&self) -> bool {
        self.monthly_savings >= 0.0
    }
}

/// Fleet-wide cost aggregation rebuilt every cycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_monthly_cost: f64,
    pub by_namespace: HashMap<String, f64>,
    pub by_storage_class: HashMap<String, f64>,
    pub by_provider: HashMap<String, f64>,
    pub by_cluster: HashMap<String, f64>,
    pub top_expensive: Vec<ResourceMetric>,
    pub zombies: Vec<ResourceMetric>,
    pub budget_limit: f64,
    pub active_alerts: Vec<String>,
}

/// Selects the resources a policy governs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySelector {
    /// Empty means every namespace
    #[serde(default)]
    pub match_namespaces: Vec<String>,
    #[serde(default)]
    pub match_labels: HashMap<String, String>,
}

impl PolicySelector {
    pub fn matches(&self, resource: &ResourceMetric) -> bool {
        let namespace_match = self.match_namespaces.is_empty()
            || self.match_namespaces.iter().any(|ns| ns == &resource.namespace);

        namespace_match
            && self
                .match_labels
                .iter()
                .all(|(k, v)| resource.labels.get(k) == Some(v))
    }
}

/// Stage in a resource's storage lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
    pub name: String,
    pub storage_class: String,
    /// Age since creation after which the tier applies, e.g. "7d" or "12h"
    pub duration: String,
}

impl Tier {
    pub fn new(
        name: impl Into<String>,
        storage_class: impl Into<String>,
        duration: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            storage_class: storage_class.into(),
            duration: duration.into(),
        }
    }
}

/// Storage lifecycle policy; tiers are ordered by increasing age threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub name: String,
    #[serde(default)]
    pub selector: PolicySelector,
    #[serde(default)]
    pub tiers: Vec<Tier>,
    #[serde(default)]
    pub auto_delete: bool,
}

/// Target state chosen by the lifecycle controller for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecommendation {
    pub target_class: String,
    pub target_tier: String,
    pub target_size: String,
    pub reason: String,
    pub confidence: f64,
}

/// Workload relationship reported by the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadAttachment {
    pub workload: String,
    pub namespace: String,
    pub claim: String,
}

/// Batched usage sample for one resource
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    pub used_bytes: u64,
    pub last_activity: Option<DateTime<Utc>>,
}
