//! Shared snapshot of the latest refresh
//!
//! The refresh loop is the only writer. It builds a complete [`Snapshot`]
//! without holding any lock and swaps it in under a brief write lock; readers
//! clone the `Arc` out under the read lock.

use crate::models::{CostSummary, Policy, Recommendation, ResourceMetric};
use crate::predictor::{growth_rates, TrendSamples};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Cost samples kept per resource
pub const DEFAULT_HISTORY_LEN: usize = 12;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub resources: Vec<ResourceMetric>,
    pub summary: CostSummary,
    pub recommendations: Vec<Recommendation>,
    pub policies: Vec<Policy>,
    pub last_update: Option<DateTime<Utc>>,
}

/// Bounded per-resource cost history across refreshes
#[derive(Debug, Clone)]
pub struct CostHistory {
    capacity: usize,
    by_resource: HashMap<String, VecDeque<f64>>,
    fleet: VecDeque<f64>,
}

impl Default for CostHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LEN)
    }
}

impl CostHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(2),
            by_resource: HashMap::new(),
            fleet: VecDeque::new(),
        }
    }

    /// Append this cycle's stamped costs; resources absent this cycle are forgotten
    pub fn record(&mut self, resources: &[ResourceMetric]) {
        let mut seen = HashSet::with_capacity(resources.len());
        let mut total = 0.0;

        for resource in resources {
            let key = resource.key();
            let samples = self.by_resource.entry(key.clone()).or_default();
            samples.push_back(resource.monthly_cost);
            if samples.len() > self.capacity {
                samples.pop_front();
            }
            total += resource.monthly_cost;
            seen.insert(key);
        }

        self.by_resource.retain(|key, _| seen.contains(key));

        self.fleet.push_back(total);
        if self.fleet.len() > self.capacity {
            self.fleet.pop_front();
        }
    }

    /// Growth rates per resource, for the forecast oracle
    pub fn trend_samples(&self) -> TrendSamples {
        self.by_resource
            .iter()
            .map(|(key, samples)| {
                let costs: Vec<f64> = samples.iter().copied().collect();
                (key.clone(), growth_rates(&costs))
            })
            .collect()
    }

    pub fn fleet_series(&self) -> Vec<f64> {
        self.fleet.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_resource.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_resource.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshot: RwLock<Arc<Snapshot>>,
    history: Mutex<CostHistory>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_len(len: usize) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            history: Mutex::new(CostHistory::new(len)),
        }
    }

    pub async fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    pub async fn replace(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        *self.snapshot.write().await = snapshot;
    }

    pub async fn summary(&self) -> CostSummary {
        self.snapshot().await.summary.clone()
    }

    pub async fn recommendations(&self) -> Vec<Recommendation> {
        self.snapshot().await.recommendations.clone()
    }

    pub async fn resources(&self) -> Vec<ResourceMetric> {
        self.snapshot().await.resources.clone()
    }

    pub async fn policies(&self) -> Vec<Policy> {
        self.snapshot().await.policies.clone()
    }

    pub async fn last_update(&self) -> Option<DateTime<Utc>> {
        self.snapshot().await.last_update
    }

    /// Record a cycle's costs and return the resulting trend and fleet series
    pub async fn record_costs(&self, resources: &[ResourceMetric]) -> (TrendSamples, Vec<f64>) {
        let mut history = self.history.lock().await;
        history.record(resources);
        (history.trend_samples(), history.fleet_series())
    }
}
