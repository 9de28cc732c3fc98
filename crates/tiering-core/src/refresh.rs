//! Snapshot refresh loop
//!
//! Periodically collects the fleet, prices it, applies budgets, ranks
//! recommendations and swaps the result into the snapshot store. A failed
//! cycle leaves the previous snapshot in place.

use crate::anomaly::CostSpikeDetector;
use crate::collector::{CollectError, CollectionPipeline, Scope};
use crate::cost::Optimizer;
use crate::governance::{apply_budgets, CostPolicy};
use crate::health::{components, HealthRegistry};
use crate::lifecycle::LifecycleController;
use crate::observability::{StructuredLogger, TieringMetrics};
use crate::policy::PolicyEngine;
use crate::pricing::Provider;
use crate::store::{Snapshot, SnapshotStore};
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};

/// Configuration for the refresh loop
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Base refresh interval (default: 60 seconds)
    pub interval: Duration,
    /// Maximum jitter added to the interval (default: 1 second)
    pub jitter: Duration,
    /// Interval used while refreshes are slow (default: 300 seconds)
    pub degraded_interval: Duration,
    /// A refresh slower than this enters degraded mode (default: 10 seconds)
    pub slow_threshold: Duration,
    pub scope: Scope,
    /// Fleet provider used for pricing
    pub provider: Provider,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            jitter: Duration::from_secs(1),
            degraded_interval: Duration::from_secs(300),
            slow_threshold: Duration::from_secs(10),
            scope: Scope::All,
            provider: Provider::Aws,
        }
    }
}

/// Headline numbers from one successful refresh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshStats {
    pub resources: usize,
    pub monthly_cost: f64,
    pub recommendations: usize,
    pub alerts: usize,
}

pub struct RefreshLoop {
    pipeline: CollectionPipeline,
    optimizer: Optimizer,
    store: Arc<SnapshotStore>,
    controller: Option<Arc<LifecycleController>>,
    budgets: Vec<CostPolicy>,
    spike: CostSpikeDetector,
    health: HealthRegistry,
    metrics: TieringMetrics,
    logger: StructuredLogger,
    config: RefreshConfig,
    degraded_mode: bool,
}

impl RefreshLoop {
    /// Refresh on every tick until shutdown. The first refresh runs immediately.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            provider = %self.config.provider,
            "Starting refresh loop"
        );

        let mut ticker = interval(self.current_interval());

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    // failures are logged and counted inside refresh
                    let _ = self.refresh(shutdown.clone()).await;
                    self.check_pressure(start.elapsed());

                    let next = self.current_interval();
                    ticker = interval(next);
                    // interval() fires immediately; consume that tick
                    ticker.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutting down refresh loop");
                        break;
                    }
                }
            }
        }
    }

    /// One full cycle: collect, price, budget, recommend, swap
    pub async fn refresh(&self, cancel: watch::Receiver<bool>) -> Result<RefreshStats, CollectError> {
        let start = Instant::now();
        let provider = self.config.provider;

        let mut resources = match self.pipeline.collect(&self.config.scope, cancel).await {
            Ok(resources) => resources,
            Err(e) => {
                self.metrics.inc_refresh_errors();
                self.logger.log_refresh_failed(&e.to_string());
                if !matches!(e, CollectError::Cancelled) {
                    self.health
                        .record_failure(components::COLLECTOR, e.to_string())
                        .await;
                }
                return Err(e);
            }
        };
        self.health.record_success(components::COLLECTOR).await;

        let mut summary = self
            .optimizer
            .engine()
            .summarize(&mut resources, provider);
        self.health.record_success(components::PRICING).await;

        apply_budgets(&mut summary, &resources, &self.budgets);

        let (trends, fleet_series) = self.store.record_costs(&resources).await;
        if let Some(spike) = self.spike.detect_in_series(&fleet_series) {
            warn!(
                current = spike.current_cost,
                average = spike.average_cost,
                ratio = spike.ratio,
                "Fleet cost spike detected"
            );
            summary.active_alerts.push(spike.describe());
        }

        let recommendations =
            self.optimizer
                .generate_with_trends(&resources, provider, &trends, Utc::now());

        let previous = self.store.snapshot().await;
        let policies = match self.pipeline.inventory().list_policies().await {
            Ok(policies) => policies,
            Err(e) => {
                warn!(error = %e, "Policy listing failed, keeping previous policy set");
                previous.policies.clone()
            }
        };
        if let Err(e) = PolicyEngine::new(policies.clone()).validate() {
            warn!(error = %e, "Policy set contains an invalid tier duration");
        }

        let potential_savings = self.optimizer.calculate_total_savings(&recommendations);
        let stats = RefreshStats {
            resources: resources.len(),
            monthly_cost: summary.total_monthly_cost,
            recommendations: recommendations.len(),
            alerts: summary.active_alerts.len(),
        };
        self.metrics.record_snapshot(
            stats.resources,
            stats.monthly_cost,
            &summary.by_namespace,
            stats.recommendations,
            potential_savings,
        );

        let policies_changed = previous.last_update.is_none() || previous.policies != policies;
        self.store
            .replace(Snapshot {
                resources,
                summary,
                recommendations,
                policies: policies.clone(),
                last_update: Some(Utc::now()),
            })
            .await;

        if policies_changed {
            if let Some(controller) = &self.controller {
                controller.set_policies(policies).await;
            }
        }

        self.health.set_ready(true).await;

        let elapsed = start.elapsed();
        self.metrics.observe_collection_latency(elapsed.as_secs_f64());
        self.logger.log_refresh_completed(
            stats.resources,
            stats.monthly_cost,
            stats.recommendations,
            stats.alerts,
            elapsed.as_millis(),
        );

        Ok(stats)
    }

    fn current_interval(&self) -> Duration {
        let base = if self.degraded_mode {
            self.config.degraded_interval
        } else {
            self.config.interval
        };

        let jitter_ms = rand_jitter(self.config.jitter.as_millis() as u64);
        base + Duration::from_millis(jitter_ms)
    }

    fn check_pressure(&mut self, elapsed: Duration) {
        let threshold = self.config.slow_threshold;

        if elapsed > threshold && !self.degraded_mode {
            warn!(
                elapsed_ms = elapsed.as_millis(),
                "Entering degraded mode due to slow refresh"
            );
            self.degraded_mode = true;
        } else if elapsed < threshold / 2 && self.degraded_mode {
            info!("Exiting degraded mode, refresh performance improved");
            self.degraded_mode = false;
        } else {
            debug!(elapsed_ms = elapsed.as_millis(), "Refresh timing");
        }
    }
}

/// Jitter between 0 and max_ms, derived from the clock
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    now % max_ms
}

/// Builder for the refresh loop
pub struct RefreshLoopBuilder {
    pipeline: Option<CollectionPipeline>,
    optimizer: Option<Optimizer>,
    store: Option<Arc<SnapshotStore>>,
    controller: Option<Arc<LifecycleController>>,
    budgets: Vec<CostPolicy>,
    health: Option<HealthRegistry>,
    logger: Option<StructuredLogger>,
    config: RefreshConfig,
}

impl RefreshLoopBuilder {
    pub fn new() -> Self {
        Self {
            pipeline: None,
            optimizer: None,
            store: None,
            controller: None,
            budgets: Vec::new(),
            health: None,
            logger: None,
            config: RefreshConfig::default(),
        }
    }

    pub fn pipeline(mut self, pipeline: CollectionPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn store(mut self, store: Arc<SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Controller that receives the policy set whenever it changes
    pub fn controller(mut self, controller: Arc<LifecycleController>) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn budgets(mut self, budgets: Vec<CostPolicy>) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn degraded_interval(mut self, interval: Duration) -> Self {
        self.config.degraded_interval = interval;
        self
    }

    pub fn slow_threshold(mut self, threshold: Duration) -> Self {
        self.config.slow_threshold = threshold;
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.config.scope = scope;
        self
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.config.provider = provider;
        self
    }

    pub fn build(self) -> Result<RefreshLoop> {
        let pipeline = self
            .pipeline
            .ok_or_else(|| anyhow::anyhow!("Collection pipeline is required"))?;
        let optimizer = self
            .optimizer
            .ok_or_else(|| anyhow::anyhow!("Optimizer is required"))?;
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Snapshot store is required"))?;

        Ok(RefreshLoop {
            pipeline,
            optimizer,
            store,
            controller: self.controller,
            budgets: self.budgets,
            spike: CostSpikeDetector::default(),
            health: self.health.unwrap_or_default(),
            metrics: TieringMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("default-cluster")),
            config: self.config,
            degraded_mode: false,
        })
    }
}

impl Default for RefreshLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
