//! Pipeline tests against in-process collaborators

use super::memory::{demo_fleet, StaticInventory, StaticTraffic, StaticUsage};
use super::*;
use crate::models::{UsageSample, EGRESS_LABEL};
use anyhow::anyhow;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

struct FailingUsage;

#[async_trait]
impl UsageSource for FailingUsage {
    async fn get_all_usage(&self) -> anyhow::Result<UsageMap> {
        Err(anyhow!("metrics backend unreachable"))
    }
}

struct FailingTraffic;

#[async_trait]
impl TrafficSource for FailingTraffic {
    async fn get_traffic_by_key(&self) -> anyhow::Result<HashMap<String, u64>> {
        Err(anyhow!("traffic monitor down"))
    }
}

/// Inventory that fails outright, or counts calls and optionally cancels mid-pass
struct ScriptedInventory {
    resources: Vec<ResourceMetric>,
    fail: bool,
    cancel_on_list: Option<watch::Sender<bool>>,
    calls: AtomicUsize,
}

impl ScriptedInventory {
    fn new(resources: Vec<ResourceMetric>) -> Self {
        Self {
            resources,
            fail: false,
            cancel_on_list: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl InventorySource for ScriptedInventory {
    async fn list_resources(&self, _scope: &Scope) -> anyhow::Result<Vec<ResourceMetric>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow!("inventory API timeout"));
        }
        if let Some(tx) = &self.cancel_on_list {
            let _ = tx.send(true);
        }
        Ok(self.resources.clone())
    }

    async fn list_policies(&self) -> anyhow::Result<Vec<Policy>> {
        Ok(Vec::new())
    }

    async fn list_attachments(&self) -> anyhow::Result<Vec<WorkloadAttachment>> {
        Err(anyhow!("relationship lookup failed"))
    }
}

fn fleet(n: usize) -> Vec<ResourceMetric> {
    (0..n)
        .map(|i| ResourceMetric::new(format!("vol-{}", i), "default", "gp3", 1024))
        .collect()
}

fn not_cancelled() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[tokio::test]
async fn test_collects_every_resource_once() {
    let inventory = Arc::new(ScriptedInventory::new(fleet(537)));
    let pipeline = CollectionPipeline::new(inventory, Arc::new(StaticUsage::new()));
    let (_tx, rx) = not_cancelled();

    let collected = pipeline.collect(&Scope::All, rx).await.unwrap();

    assert_eq!(collected.len(), 537);
    let names: HashSet<_> = collected.iter().map(|r| r.name.clone()).collect();
    assert_eq!(names.len(), 537);
}

#[tokio::test]
async fn test_demo_fleet_enrichment() {
    let demo = demo_fleet(Utc::now());
    let pipeline = CollectionPipeline::new(Arc::new(demo.inventory), Arc::new(demo.usage))
        .with_traffic(Arc::new(demo.traffic));
    let (_tx, rx) = not_cancelled();

    let collected = pipeline.collect(&Scope::All, rx).await.unwrap();
    assert_eq!(collected.len(), 6);

    let postgres = collected.iter().find(|r| r.name == "postgres-data").unwrap();
    assert!(postgres.used_bytes > 0);
    assert_eq!(postgres.mounted_by, vec!["statefulset/postgres".to_string()]);
    assert!(postgres.labels.contains_key(EGRESS_LABEL));

    let archive = collected.iter().find(|r| r.name == "event-archive").unwrap();
    assert!(archive.is_zombie());
}

#[tokio::test]
async fn test_scoped_collection() {
    let demo = demo_fleet(Utc::now());
    let pipeline = CollectionPipeline::new(Arc::new(demo.inventory), Arc::new(demo.usage));
    let (_tx, rx) = not_cancelled();

    let collected = pipeline
        .collect(&Scope::Namespace("analytics".to_string()), rx)
        .await
        .unwrap();
    assert_eq!(collected.len(), 2);
    assert!(collected.iter().all(|r| r.namespace == "analytics"));
}

#[tokio::test]
async fn test_inventory_failure_aborts() {
    let mut inventory = ScriptedInventory::new(fleet(3));
    inventory.fail = true;
    let pipeline = CollectionPipeline::new(Arc::new(inventory), Arc::new(StaticUsage::new()));
    let (_tx, rx) = not_cancelled();

    let err = pipeline.collect(&Scope::All, rx).await.unwrap_err();
    assert!(matches!(
        err,
        CollectError::Upstream {
            source_name: "inventory",
            ..
        }
    ));
}

#[tokio::test]
async fn test_usage_failure_aborts() {
    let pipeline = CollectionPipeline::new(
        Arc::new(ScriptedInventory::new(fleet(3))),
        Arc::new(FailingUsage),
    );
    let (_tx, rx) = not_cancelled();

    let err = pipeline.collect(&Scope::All, rx).await.unwrap_err();
    assert!(matches!(
        err,
        CollectError::Upstream {
            source_name: "usage",
            ..
        }
    ));
}

#[tokio::test]
async fn test_traffic_failure_is_tolerated() {
    let usage = StaticUsage::new().with_sample(
        "default",
        "vol-0",
        UsageSample {
            used_bytes: 512,
            last_activity: None,
        },
    );
    let pipeline = CollectionPipeline::new(
        Arc::new(ScriptedInventory::new(fleet(2))),
        Arc::new(usage),
    )
    .with_traffic(Arc::new(FailingTraffic));
    let (_tx, rx) = not_cancelled();

    let collected = pipeline.collect(&Scope::All, rx).await.unwrap();
    assert_eq!(collected.len(), 2);
    assert!(collected.iter().all(|r| r.egress_bytes == 0));
    let vol0 = collected.iter().find(|r| r.name == "vol-0").unwrap();
    assert_eq!(vol0.used_bytes, 512);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let inventory = Arc::new(ScriptedInventory::new(fleet(10)));
    let pipeline = CollectionPipeline::new(inventory.clone(), Arc::new(StaticUsage::new()));
    let (tx, rx) = not_cancelled();
    tx.send(true).unwrap();

    let err = pipeline.collect(&Scope::All, rx).await.unwrap_err();
    assert!(matches!(err, CollectError::Cancelled));
    assert_eq!(inventory.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_mid_pass() {
    let (tx, rx) = not_cancelled();
    let mut inventory = ScriptedInventory::new(fleet(200));
    inventory.cancel_on_list = Some(tx);

    let pipeline = CollectionPipeline::new(Arc::new(inventory), Arc::new(StaticUsage::new()));
    let err = pipeline.collect(&Scope::All, rx).await.unwrap_err();
    assert!(matches!(err, CollectError::Cancelled));
}

#[tokio::test]
async fn test_empty_inventory() {
    let pipeline = CollectionPipeline::new(
        Arc::new(StaticInventory::new(Vec::new())),
        Arc::new(FailingUsage),
    )
    .with_traffic(Arc::new(StaticTraffic::new()));
    let (_tx, rx) = not_cancelled();

    // nothing to enrich, so usage is never consulted
    let collected = pipeline.collect(&Scope::All, rx).await.unwrap();
    assert!(collected.is_empty());
}
