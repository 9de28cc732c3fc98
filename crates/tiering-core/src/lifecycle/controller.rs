//! Lifecycle reconciliation loop
//!
//! Level-triggered: every tick re-derives each resource's target from its
//! reported class and age. The request ledger keeps an unchanged decision
//! from being submitted again while it is in flight.

use super::migration::{MigrationExecutor, MigrationRequest, RequestLedger};
use super::recommender::{IntelligentRecommender, Proposal, ProposalKind};
use crate::cost::format_quantity;
use crate::health::{components, HealthRegistry};
use crate::models::{OptimizationRecommendation, Policy, ResourceMetric};
use crate::observability::{StructuredLogger, TieringMetrics};
use crate::policy::PolicyEngine;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info};

/// Default reconcile cadence (default: 5 minutes)
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(300);

/// Counts from one reconcile pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub evaluated: usize,
    pub unmatched: usize,
    pub proposed: usize,
    pub submitted: usize,
    pub suppressed: usize,
    pub failed: usize,
    pub evaluation_errors: usize,
}

/// What happened to one proposed transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// No executor configured; the decision was only logged
    Logged,
    Submitted(String),
    Suppressed,
    Failed(String),
}

pub struct LifecycleController {
    engine: RwLock<Option<Arc<PolicyEngine>>>,
    recommender: IntelligentRecommender,
    executor: Option<Arc<dyn MigrationExecutor>>,
    ledger: RequestLedger,
    interval: Duration,
    health: Option<HealthRegistry>,
    metrics: TieringMetrics,
    logger: StructuredLogger,
}

impl LifecycleController {
    pub fn new(recommender: IntelligentRecommender, logger: StructuredLogger) -> Self {
        Self {
            engine: RwLock::new(None),
            recommender,
            executor: None,
            ledger: RequestLedger::default(),
            interval: DEFAULT_RECONCILE_INTERVAL,
            health: None,
            metrics: TieringMetrics::new(),
            logger,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn MigrationExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_ledger(mut self, ledger: RequestLedger) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn ledger(&self) -> &RequestLedger {
        &self.ledger
    }

    /// Replace the whole policy set
    pub async fn set_policies(&self, policies: Vec<Policy>) {
        let next = Arc::new(PolicyEngine::new(policies));
        let mut engine = self.engine.write().await;
        let previous = engine.as_ref().map_or(0, |e| e.len());
        *engine = Some(Arc::clone(&next));
        drop(engine);

        self.logger.log_policy_set_replaced(previous, next.len());
    }

    pub async fn policies(&self) -> Vec<Policy> {
        match self.engine.read().await.as_ref() {
            Some(engine) => engine.policies().to_vec(),
            None => Vec::new(),
        }
    }

    /// Reconcile on every tick until shutdown, pulling metrics from `supplier`
    pub async fn start<F, Fut>(&self, mut shutdown: watch::Receiver<bool>, supplier: F)
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = Vec<ResourceMetric>> + Send,
    {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting lifecycle controller"
        );

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let resources = supplier().await;
                    self.reconcile(&resources).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutting down lifecycle controller");
                        break;
                    }
                }
            }
        }
    }

    /// One pass over the fleet. Failures are scoped to a single resource.
    pub async fn reconcile(&self, resources: &[ResourceMetric]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let Some(engine) = self.engine.read().await.clone() else {
            debug!("No policy set loaded, skipping reconcile");
            return report;
        };

        let start = Instant::now();
        self.ledger.prune(Utc::now());

        debug!(resources = resources.len(), "Reconciling storage lifecycle policies");

        for resource in resources {
            report.evaluated += 1;
            let key = resource.key();

            let Some(policy) = engine.match_policy(resource) else {
                report.unmatched += 1;
                self.ledger.clear(&key);
                continue;
            };

            let proposal = match self.recommender.recommend(resource, policy).await {
                Some(proposal) => Some(proposal),
                None => match engine.evaluate(resource, policy) {
                    Ok(tier) => tier.map(|tier| Proposal {
                        kind: ProposalKind::PolicyTier,
                        recommendation: OptimizationRecommendation {
                            target_class: tier.storage_class.clone(),
                            target_tier: tier.name.clone(),
                            target_size: format_quantity(resource.capacity_bytes),
                            reason: format!(
                                "Rule-based tiering: policy {} threshold for tier {} elapsed",
                                policy.name, tier.name
                            ),
                            confidence: 1.0,
                        },
                    }),
                    Err(e) => {
                        error!(
                            resource = %key,
                            policy = %policy.name,
                            error = %e,
                            "Policy evaluation failed"
                        );
                        report.evaluation_errors += 1;
                        self.metrics.inc_policy_evaluation_errors();
                        continue;
                    }
                },
            };

            let Some(proposal) = proposal else {
                self.ledger.clear(&key);
                continue;
            };

            report.proposed += 1;
            match self.execute_transition(resource, policy, &proposal).await {
                TransitionOutcome::Submitted(_) => report.submitted += 1,
                TransitionOutcome::Suppressed => report.suppressed += 1,
                TransitionOutcome::Failed(_) => report.failed += 1,
                TransitionOutcome::Logged => {}
            }
        }

        self.metrics
            .observe_reconcile_latency(start.elapsed().as_secs_f64());
        if let Some(health) = &self.health {
            health.record_success(components::CONTROLLER).await;
        }

        debug!(?report, "Reconcile pass complete");
        report
    }

    /// Log the decision and, with an executor configured, request it once
    pub async fn execute_transition(
        &self,
        resource: &ResourceMetric,
        policy: &Policy,
        proposal: &Proposal,
    ) -> TransitionOutcome {
        let key = resource.key();
        let rec = &proposal.recommendation;

        self.logger.log_transition_proposed(
            &key,
            &policy.name,
            proposal.kind.as_str(),
            &resource.storage_class,
            &rec.target_class,
            &rec.target_tier,
            rec.confidence,
            &rec.reason,
        );

        let Some(executor) = &self.executor else {
            return TransitionOutcome::Logged;
        };

        let request = MigrationRequest::from(rec);
        let now = Utc::now();

        if let Some(age) = self.ledger.suppressed_for(&key, &request, now) {
            self.metrics.inc_migrations_suppressed();
            self.logger
                .log_migration_suppressed(&key, &request.target_class, age.num_seconds());
            return TransitionOutcome::Suppressed;
        }

        match executor.trigger_migration(resource, &request).await {
            Ok(workflow_id) => {
                self.metrics.inc_migrations_submitted();
                self.logger
                    .log_migration_submitted(&key, &request.target_class, &workflow_id);
                if proposal.kind == ProposalKind::Placement {
                    self.recommender.feedback(resource, &request.target_class, 1.0);
                }
                self.ledger.record(&key, request, now);
                if let Some(health) = &self.health {
                    health.record_success(components::MIGRATION).await;
                }
                TransitionOutcome::Submitted(workflow_id)
            }
            Err(e) => {
                let message = e.to_string();
                self.metrics.inc_migrations_failed();
                self.logger
                    .log_migration_failed(&key, &request.target_class, &message);
                if let Some(health) = &self.health {
                    health
                        .record_failure(components::MIGRATION, message.clone())
                        .await;
                }
                TransitionOutcome::Failed(message)
            }
        }
    }
}
