//! Bounded fan-out enrichment of enumerated resources

use super::{CollectError, InventorySource, Scope, TrafficSource, UsageMap, UsageSource};
use crate::models::{ResourceMetric, EGRESS_LABEL};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Worker pool sizing for a collection pass
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Fewest workers spawned for a non-empty fleet (default: 5)
    pub min_workers: usize,
    /// Most workers ever spawned (default: 50)
    pub max_workers: usize,
    /// Resources each worker is expected to handle (default: 20)
    pub resources_per_worker: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            min_workers: 5,
            max_workers: 50,
            resources_per_worker: 20,
        }
    }
}

impl CollectionConfig {
    /// Workers for `resources` items, never more than there is work for
    pub fn worker_count(&self, resources: usize) -> usize {
        if resources == 0 {
            return 0;
        }
        let per_worker = self.resources_per_worker.max(1);
        let max = self.max_workers.max(1);
        (resources / per_worker)
            .clamp(self.min_workers.min(max), max)
            .min(resources)
    }
}

/// Batched lookups shared read-only by every worker
#[derive(Default)]
struct Enrichment {
    usage: UsageMap,
    traffic: HashMap<String, u64>,
    mounted_by: HashMap<(String, String), Vec<String>>,
}

impl Enrichment {
    fn apply(&self, mut resource: ResourceMetric) -> ResourceMetric {
        if let Some(sample) = self
            .usage
            .get(&resource.namespace)
            .and_then(|by_name| by_name.get(&resource.name))
        {
            resource.used_bytes = sample.used_bytes;
            if sample.last_activity.is_some() {
                resource.last_accessed_at = sample.last_activity;
            }
        }

        if let Some(bytes) = self.traffic.get(&resource.namespace) {
            resource.egress_bytes = *bytes;
            resource
                .labels
                .insert(EGRESS_LABEL.to_string(), bytes.to_string());
        }

        if let Some(workloads) = self
            .mounted_by
            .get(&(resource.namespace.clone(), resource.name.clone()))
        {
            resource.mounted_by = workloads.clone();
        }

        resource
    }
}

/// Collects and enriches resources for one cycle
pub struct CollectionPipeline {
    inventory: Arc<dyn InventorySource>,
    usage: Arc<dyn UsageSource>,
    traffic: Option<Arc<dyn TrafficSource>>,
    config: CollectionConfig,
}

impl CollectionPipeline {
    pub fn new(inventory: Arc<dyn InventorySource>, usage: Arc<dyn UsageSource>) -> Self {
        Self {
            inventory,
            usage,
            traffic: None,
            config: CollectionConfig::default(),
        }
    }

    pub fn with_traffic(mut self, traffic: Arc<dyn TrafficSource>) -> Self {
        self.traffic = Some(traffic);
        self
    }

    pub fn with_config(mut self, config: CollectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn inventory(&self) -> &Arc<dyn InventorySource> {
        &self.inventory
    }

    /// Enumerate `scope` and enrich every resource.
    ///
    /// Inventory and usage failures abort the pass. Traffic and relationship
    /// failures are logged and the pass continues without that enrichment.
    /// Output order follows worker completion, not inventory order.
    pub async fn collect(
        &self,
        scope: &Scope,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Vec<ResourceMetric>, CollectError> {
        let start = Instant::now();

        if *cancel.borrow() {
            return Err(CollectError::Cancelled);
        }

        let resources = self
            .inventory
            .list_resources(scope)
            .await
            .map_err(|e| CollectError::upstream("inventory", e))?;
        if resources.is_empty() {
            return Ok(Vec::new());
        }

        let enrichment = Arc::new(self.fetch_enrichment().await?);

        let total = resources.len();
        let workers = self.config.worker_count(total);

        let (job_tx, job_rx) = mpsc::channel(total);
        for resource in resources {
            // capacity equals the job count, so this never waits
            if job_tx.send(resource).await.is_err() {
                return Err(CollectError::WorkerLost {
                    expected: total,
                    received: 0,
                });
            }
        }
        drop(job_tx);

        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::channel(total);

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let enrichment = Arc::clone(&enrichment);
            let cancel = cancel.clone();

            pool.spawn(async move {
                loop {
                    if *cancel.borrow() {
                        break;
                    }
                    let next = jobs.lock().await.recv().await;
                    let Some(resource) = next else {
                        break;
                    };
                    if results.send(enrichment.apply(resource)).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut collected = Vec::with_capacity(total);
        let mut watching = true;
        while collected.len() < total {
            tokio::select! {
                biased;

                changed = cancel.changed(), if watching => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            pool.abort_all();
                            return Err(CollectError::Cancelled);
                        }
                        Ok(()) => {}
                        // sender gone; nobody can cancel any more
                        Err(_) => watching = false,
                    }
                }
                result = result_rx.recv() => match result {
                    Some(resource) => collected.push(resource),
                    None if *cancel.borrow() => return Err(CollectError::Cancelled),
                    None => {
                        return Err(CollectError::WorkerLost {
                            expected: total,
                            received: collected.len(),
                        });
                    }
                }
            }
        }

        debug!(
            resources = total,
            workers,
            elapsed_ms = start.elapsed().as_millis(),
            "Collection pass complete"
        );

        Ok(collected)
    }

    async fn fetch_enrichment(&self) -> Result<Enrichment, CollectError> {
        let usage = self
            .usage
            .get_all_usage()
            .await
            .map_err(|e| CollectError::upstream("usage", e))?;

        let traffic = match &self.traffic {
            Some(source) => match source.get_traffic_by_key().await {
                Ok(traffic) => traffic,
                Err(e) => {
                    warn!(error = %e, "Traffic lookup failed, continuing without egress data");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };

        let mut mounted_by: HashMap<(String, String), Vec<String>> = HashMap::new();
        match self.inventory.list_attachments().await {
            Ok(attachments) => {
                for a in attachments {
                    mounted_by
                        .entry((a.namespace, a.claim))
                        .or_default()
                        .push(a.workload);
                }
            }
            Err(e) => {
                warn!(error = %e, "Attachment lookup failed, continuing without relationships");
            }
        }

        Ok(Enrichment {
            usage,
            traffic,
            mounted_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_count_bounds() {
        let config = CollectionConfig::default();
        assert_eq!(config.worker_count(0), 0);
        assert_eq!(config.worker_count(3), 3);
        assert_eq!(config.worker_count(40), 5);
        assert_eq!(config.worker_count(400), 20);
        assert_eq!(config.worker_count(100_000), 50);
    }

    #[test]
    fn test_enrichment_apply() {
        let mut enrichment = Enrichment::default();
        enrichment.usage.entry("prod".to_string()).or_default().insert(
            "data".to_string(),
            crate::models::UsageSample {
                used_bytes: 42,
                last_activity: None,
            },
        );
        enrichment.traffic.insert("prod".to_string(), 1024);
        enrichment
            .mounted_by
            .insert(("prod".to_string(), "data".to_string()), vec!["api".to_string()]);

        let r = enrichment.apply(ResourceMetric::new("data", "prod", "gp3", 100));
        assert_eq!(r.used_bytes, 42);
        assert_eq!(r.egress_bytes, 1024);
        assert_eq!(r.labels.get(EGRESS_LABEL).map(String::as_str), Some("1024"));
        assert_eq!(r.mounted_by, vec!["api".to_string()]);
        assert!(r.last_accessed_at.is_none());

        let other = enrichment.apply(ResourceMetric::new("data", "dev", "gp3", 100));
        assert_eq!(other.used_bytes, 0);
        assert!(other.labels.is_empty());
    }
}
