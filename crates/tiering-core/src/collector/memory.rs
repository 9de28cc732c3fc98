//! In-process collaborators
//!
//! Static inventory, usage and traffic sources backed by plain values, plus a
//! small demo fleet. Policies can be read from a JSON document on every call
//! so edits are picked up by the next refresh.

use super::{async_trait, InventorySource, Scope, TrafficSource, UsageMap, UsageSource};
use crate::governance::CostPolicy;
use crate::models::{
    Policy, PolicySelector, ResourceMetric, Tier, UsageSample, WorkloadAttachment, BYTES_PER_GIB,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// On-disk policy document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub budgets: Vec<CostPolicy>,
}

pub async fn load_policy_document(path: &Path) -> Result<PolicyDocument> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read policy file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse policy file {}", path.display()))
}

pub struct StaticInventory {
    resources: Vec<ResourceMetric>,
    attachments: Vec<WorkloadAttachment>,
    policies: RwLock<Vec<Policy>>,
    policy_file: Option<PathBuf>,
}

impl StaticInventory {
    pub fn new(resources: Vec<ResourceMetric>) -> Self {
        Self {
            resources,
            attachments: Vec::new(),
            policies: RwLock::new(Vec::new()),
            policy_file: None,
        }
    }

    pub fn with_policies(mut self, policies: Vec<Policy>) -> Self {
        self.policies = RwLock::new(policies);
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<WorkloadAttachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Read policies from `path` on every listing instead of the static set
    pub fn with_policy_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.policy_file = Some(path.into());
        self
    }

    pub async fn set_policies(&self, policies: Vec<Policy>) {
        *self.policies.write().await = policies;
    }
}

#[async_trait]
impl InventorySource for StaticInventory {
    async fn list_resources(&self, scope: &Scope) -> Result<Vec<ResourceMetric>> {
        Ok(self
            .resources
            .iter()
            .filter(|r| scope.includes(&r.namespace))
            .cloned()
            .collect())
    }

    async fn list_policies(&self) -> Result<Vec<Policy>> {
        match &self.policy_file {
            Some(path) => Ok(load_policy_document(path).await?.policies),
            None => Ok(self.policies.read().await.clone()),
        }
    }

    async fn list_attachments(&self) -> Result<Vec<WorkloadAttachment>> {
        Ok(self.attachments.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticUsage {
    samples: UsageMap,
}

impl StaticUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample(mut self, namespace: &str, name: &str, sample: UsageSample) -> Self {
        self.samples
            .entry(namespace.to_string())
            .or_default()
            .insert(name.to_string(), sample);
        self
    }
}

#[async_trait]
impl UsageSource for StaticUsage {
    async fn get_all_usage(&self) -> Result<UsageMap> {
        Ok(self.samples.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticTraffic {
    bytes: HashMap<String, u64>,
}

impl StaticTraffic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bytes(mut self, key: &str, bytes: u64) -> Self {
        self.bytes.insert(key.to_string(), bytes);
        self
    }
}

#[async_trait]
impl TrafficSource for StaticTraffic {
    async fn get_traffic_by_key(&self) -> Result<HashMap<String, u64>> {
        Ok(self.bytes.clone())
    }
}

/// Collaborators describing a small mixed fleet
pub struct DemoFleet {
    pub inventory: StaticInventory,
    pub usage: StaticUsage,
    pub traffic: StaticTraffic,
}

pub fn demo_policies() -> Vec<Policy> {
    vec![
        Policy {
            name: "archive".to_string(),
            selector: PolicySelector {
                match_namespaces: Vec::new(),
                match_labels: HashMap::from([("tier".to_string(), "archive".to_string())]),
            },
            tiers: vec![
                Tier::new("hot", "gp3", "0s"),
                Tier::new("warm", "st1", "7d"),
                Tier::new("cold", "sc1", "30d"),
            ],
            auto_delete: false,
        },
        Policy {
            name: "default".to_string(),
            selector: PolicySelector::default(),
            tiers: vec![
                Tier::new("hot", "gp3", "0s"),
                Tier::new("warm", "st1", "30d"),
                Tier::new("cold", "sc1", "90d"),
            ],
            auto_delete: false,
        },
    ]
}

pub fn demo_fleet(now: DateTime<Utc>) -> DemoFleet {
    let volume = |name: &str, ns: &str, class: &str, gib: u64, age_days: i64| {
        let mut r = ResourceMetric::new(name, ns, class, gib * BYTES_PER_GIB);
        r.cluster_id = Some("demo-cluster".to_string());
        r.provider = Some("aws".to_string());
        r.region = Some("us-east-1".to_string());
        r.created_at = Some(now - Duration::days(age_days));
        r
    };

    let mut postgres = volume("postgres-data", "prod", "io1", 500, 120);
    postgres.read_iops = 1800.0;
    postgres.write_iops = 600.0;
    postgres.labels.insert("app".to_string(), "postgres".to_string());

    let mut cache = volume("api-cache", "prod", "gp2", 100, 45);
    cache.read_iops = 250.0;

    let mut archive = volume("event-archive", "analytics", "gp3", 1000, 200);
    archive.read_iops = 40.0;
    archive.labels.insert("tier".to_string(), "archive".to_string());

    let mut scratch = volume("scratch", "analytics", "gp3", 200, 10);
    scratch.read_iops = 2500.0;
    scratch.write_iops = 1000.0;

    let mut build_cache = volume("build-cache", "dev", "gp2", 50, 3);
    build_cache.read_iops = 800.0;

    let mut reports = volume("legacy-reports", "dev", "gcp-pd-ssd", 300, 60);
    reports.provider = Some("gcp".to_string());
    reports.region = Some("us-central1".to_string());
    reports.read_iops = 150.0;

    let inventory = StaticInventory::new(vec![postgres, cache, archive, scratch, build_cache, reports])
        .with_policies(demo_policies())
        .with_attachments(vec![
            WorkloadAttachment {
                workload: "statefulset/postgres".to_string(),
                namespace: "prod".to_string(),
                claim: "postgres-data".to_string(),
            },
            WorkloadAttachment {
                workload: "deployment/api".to_string(),
                namespace: "prod".to_string(),
                claim: "api-cache".to_string(),
            },
        ]);

    let sample = |gib: u64, idle_days: i64| UsageSample {
        used_bytes: gib * BYTES_PER_GIB,
        last_activity: Some(now - Duration::days(idle_days)),
    };
    let usage = StaticUsage::new()
        .with_sample("prod", "postgres-data", sample(420, 0))
        .with_sample("prod", "api-cache", sample(12, 0))
        .with_sample("analytics", "event-archive", sample(900, 90))
        .with_sample("analytics", "scratch", sample(10, 1))
        .with_sample("dev", "build-cache", sample(30, 0))
        .with_sample("dev", "legacy-reports", sample(100, 5));

    let traffic = StaticTraffic::new()
        .with_bytes("prod", 500 * 1024 * 1024)
        .with_bytes("analytics", 20 * 1024 * 1024);

    DemoFleet {
        inventory,
        usage,
        traffic,
    }
}
