//! Controller scenarios with in-process executors

use super::*;
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::models::{Policy, PolicySelector, ResourceMetric, Tier, BYTES_PER_GIB};
use crate::observability::StructuredLogger;
use crate::predictor::ScoredPlacement;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Default)]
struct CountingExecutor {
    requests: Mutex<Vec<(String, MigrationRequest)>>,
    fail: AtomicBool,
}

impl CountingExecutor {
    fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last(&self) -> Option<(String, MigrationRequest)> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl MigrationExecutor for CountingExecutor {
    async fn trigger_migration(
        &self,
        resource: &ResourceMetric,
        request: &MigrationRequest,
    ) -> Result<String, MigrationError> {
        self.requests
            .lock()
            .unwrap()
            .push((resource.key(), request.clone()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(MigrationError::Unavailable("workflow engine down".to_string()));
        }
        Ok(format!("wf-{}", self.count()))
    }
}

fn tiered_policy() -> Policy {
    Policy {
        name: "archive".to_string(),
        selector: PolicySelector {
            match_namespaces: vec!["data".to_string()],
            match_labels: HashMap::new(),
        },
        tiers: vec![
            Tier::new("hot", "gp3", "0s"),
            Tier::new("warm", "st1", "7d"),
            Tier::new("cold", "sc1", "30d"),
        ],
        auto_delete: false,
    }
}

/// Aged volume with no usage telemetry, so only the policy path applies
fn aged(name: &str, class: &str, days: i64) -> ResourceMetric {
    let mut r = ResourceMetric::new(name, "data", class, 100 * BYTES_PER_GIB);
    r.created_at = Some(Utc::now() - ChronoDuration::days(days));
    r
}

fn recommender() -> IntelligentRecommender {
    IntelligentRecommender::new(Arc::new(ScoredPlacement::with_defaults()))
}

fn controller(executor: Arc<CountingExecutor>) -> LifecycleController {
    LifecycleController::new(recommender(), StructuredLogger::new("test-cluster"))
        .with_executor(executor)
}

#[tokio::test]
async fn test_no_policies_is_noop() {
    let executor = Arc::new(CountingExecutor::default());
    let c = controller(executor.clone());

    let report = c.reconcile(&[aged("a", "gp3", 40)]).await;
    assert_eq!(report, ReconcileReport::default());
    assert_eq!(executor.count(), 0);
}

#[tokio::test]
async fn test_rule_based_transition_submitted_once() {
    let executor = Arc::new(CountingExecutor::default());
    let c = controller(executor.clone());
    c.set_policies(vec![tiered_policy()]).await;

    let fleet = vec![aged("logs", "gp3", 40)];

    let report = c.reconcile(&fleet).await;
    assert_eq!(report.proposed, 1);
    assert_eq!(report.submitted, 1);

    let (key, request) = executor.last().unwrap();
    assert_eq!(key, fleet[0].key());
    assert_eq!(request.target_class, "sc1");
    assert_eq!(request.target_tier, "cold");
    assert_eq!(request.target_size, "100Gi");

    // still eligible next tick, but already requested
    let report = c.reconcile(&fleet).await;
    assert_eq!(report.suppressed, 1);
    assert_eq!(report.submitted, 0);
    assert_eq!(executor.count(), 1);
}

#[tokio::test]
async fn test_changed_decision_requested_again() {
    let executor = Arc::new(CountingExecutor::default());
    let c = controller(executor.clone());
    c.set_policies(vec![tiered_policy()]).await;

    c.reconcile(&[aged("logs", "gp3", 10)]).await;
    assert_eq!(executor.last().unwrap().1.target_class, "st1");

    c.reconcile(&[aged("logs", "gp3", 40)]).await;
    assert_eq!(executor.count(), 2);
    assert_eq!(executor.last().unwrap().1.target_class, "sc1");
}

#[tokio::test]
async fn test_reeligibility_after_transition() {
    let executor = Arc::new(CountingExecutor::default());
    let c = controller(executor.clone());
    c.set_policies(vec![tiered_policy()]).await;

    c.reconcile(&[aged("logs", "gp3", 40)]).await;
    assert_eq!(c.ledger().len(), 1);

    // migrated: nothing left to propose, entry cleared
    let report = c.reconcile(&[aged("logs", "sc1", 40)]).await;
    assert_eq!(report.proposed, 0);
    assert!(c.ledger().is_empty());

    // moved back by hand, eligible again: exactly one new request
    c.reconcile(&[aged("logs", "gp3", 41)]).await;
    c.reconcile(&[aged("logs", "gp3", 41)]).await;
    assert_eq!(executor.count(), 2);
}

#[tokio::test]
async fn test_failed_request_retried_next_tick() {
    let executor = Arc::new(CountingExecutor::default());
    executor.fail.store(true, Ordering::SeqCst);
    let health = HealthRegistry::new();
    let c = controller(executor.clone()).with_health(health.clone());
    c.set_policies(vec![tiered_policy()]).await;

    let fleet = vec![aged("logs", "gp3", 40)];
    let report = c.reconcile(&fleet).await;
    assert_eq!(report.failed, 1);
    assert!(c.ledger().is_empty());
    assert_eq!(
        health.health().await.components[components::MIGRATION].status,
        ComponentStatus::Degraded
    );

    executor.fail.store(false, Ordering::SeqCst);
    let report = c.reconcile(&fleet).await;
    assert_eq!(report.submitted, 1);
    assert_eq!(executor.count(), 2);
    assert_eq!(
        health.health().await.components[components::MIGRATION].status,
        ComponentStatus::Healthy
    );
}

#[tokio::test]
async fn test_intelligent_path_takes_priority() {
    let executor = Arc::new(CountingExecutor::default());
    let c = controller(executor.clone());
    c.set_policies(vec![tiered_policy()]).await;

    let mut r = aged("oversized", "gp3", 40);
    r.used_bytes = 10 * BYTES_PER_GIB;

    c.reconcile(&[r]).await;
    let (_, request) = executor.last().unwrap();
    assert_eq!(request.target_class, "gp3");
    assert_eq!(request.target_size, "15Gi");
}

#[tokio::test]
async fn test_tiered_volume_not_moved_back_by_placement() {
    let executor = Arc::new(CountingExecutor::default());
    let c = controller(executor.clone());
    c.set_policies(vec![tiered_policy()]).await;

    let mut r = aged("logs", "gp3", 40);
    r.used_bytes = 80 * BYTES_PER_GIB;
    c.reconcile(&[r.clone()]).await;
    assert_eq!(executor.last().unwrap().1.target_class, "sc1");

    // migrated to the cold tier and still busy: nothing to do on later ticks
    r.storage_class = "sc1".to_string();
    for _ in 0..3 {
        let report = c.reconcile(&[r.clone()]).await;
        assert_eq!(report.proposed, 0);
    }
    assert_eq!(executor.count(), 1);
}

#[tokio::test]
async fn test_idle_cold_volume_gets_no_noop_request() {
    let executor = Arc::new(CountingExecutor::default());
    let c = controller(executor.clone());
    c.set_policies(vec![tiered_policy()]).await;

    let mut r = ResourceMetric::new("idle", "data", "sc1", 5 * BYTES_PER_GIB);
    r.used_bytes = 1024 * 1024;
    r.created_at = Some(Utc::now() - ChronoDuration::days(60));

    let report = c.reconcile(&[r]).await;
    assert_eq!(report.proposed, 0);
    assert_eq!(executor.count(), 0);
}

#[tokio::test]
async fn test_placement_applies_outside_tier_ladder() {
    let executor = Arc::new(CountingExecutor::default());
    let c = controller(executor.clone());
    c.set_policies(vec![tiered_policy()]).await;

    let mut r = aged("legacy", "gp2", 3);
    r.used_bytes = 80 * BYTES_PER_GIB;
    c.reconcile(&[r.clone()]).await;
    assert_eq!(executor.last().unwrap().1.target_class, "gp3");

    // on gp3 the placement path is silent and the policy keeps it hot
    r.storage_class = "gp3".to_string();
    let report = c.reconcile(&[r]).await;
    assert_eq!(report.proposed, 0);
    assert_eq!(executor.count(), 1);
}

#[tokio::test]
async fn test_bad_policy_scoped_to_resource() {
    let executor = Arc::new(CountingExecutor::default());
    let c = controller(executor.clone());

    let mut broken = tiered_policy();
    broken.name = "broken".to_string();
    broken.selector = PolicySelector {
        match_namespaces: vec![],
        match_labels: HashMap::from([("broken".to_string(), "true".to_string())]),
    };
    broken.tiers[2].duration = "soon".to_string();
    c.set_policies(vec![broken, tiered_policy()]).await;

    let mut bad = aged("bad", "gp3", 40);
    bad.labels.insert("broken".to_string(), "true".to_string());
    let good = aged("good", "gp3", 40);

    let report = c.reconcile(&[bad, good]).await;
    assert_eq!(report.evaluation_errors, 1);
    assert_eq!(report.submitted, 1);
    assert!(executor.last().unwrap().0.ends_with("/data/good"));
}

#[tokio::test]
async fn test_unmatched_resources_skipped() {
    let executor = Arc::new(CountingExecutor::default());
    let c = controller(executor.clone());
    c.set_policies(vec![tiered_policy()]).await;

    let mut elsewhere = aged("web", "gp3", 40);
    elsewhere.namespace = "frontend".to_string();

    let report = c.reconcile(&[elsewhere]).await;
    assert_eq!(report.unmatched, 1);
    assert_eq!(executor.count(), 0);
}

#[tokio::test]
async fn test_without_executor_only_logs() {
    let c = LifecycleController::new(recommender(), StructuredLogger::new("test-cluster"));
    c.set_policies(vec![tiered_policy()]).await;

    let report = c.reconcile(&[aged("logs", "gp3", 40)]).await;
    assert_eq!(report.proposed, 1);
    assert_eq!(report.submitted, 0);
    assert!(c.ledger().is_empty());
}

#[tokio::test]
async fn test_set_policies_replaces_wholesale() {
    let c = controller(Arc::new(CountingExecutor::default()));
    c.set_policies(vec![tiered_policy(), tiered_policy()]).await;
    assert_eq!(c.policies().await.len(), 2);

    c.set_policies(Vec::new()).await;
    assert!(c.policies().await.is_empty());
}

#[tokio::test]
async fn test_start_ticks_until_shutdown() {
    let executor = Arc::new(CountingExecutor::default());
    let c = Arc::new(controller(executor.clone()).with_interval(Duration::from_millis(10)));
    c.set_policies(vec![tiered_policy()]).await;

    let ticks = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = watch::channel(false);

    let handle = {
        let c = Arc::clone(&c);
        let ticks = Arc::clone(&ticks);
        tokio::spawn(async move {
            c.start(rx, move || {
                let ticks = Arc::clone(&ticks);
                async move {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    vec![aged("logs", "gp3", 40)]
                }
            })
            .await;
        })
    };

    tokio::time::sleep(Duration::from_millis(60)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(ticks.load(Ordering::SeqCst) >= 2);
    // level-triggered ticks, but a single request
    assert_eq!(executor.count(), 1);
}
