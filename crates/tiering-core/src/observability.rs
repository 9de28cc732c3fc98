//! Observability infrastructure for the tiering agent
//!
//! Provides:
//! - Prometheus metrics (refresh and reconcile latency, fleet cost, migrations)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_counter,
    register_int_gauge, Gauge, GaugeVec, Histogram, IntCounter, IntGauge,
};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<TieringMetricsInner> = OnceLock::new();

struct TieringMetricsInner {
    collection_latency_seconds: Histogram,
    reconcile_latency_seconds: Histogram,
    resources_observed: IntGauge,
    fleet_monthly_cost: Gauge,
    namespace_monthly_cost: GaugeVec,
    recommendations: IntGauge,
    potential_savings: Gauge,
    refresh_errors: IntCounter,
    migrations_submitted: IntCounter,
    migrations_failed: IntCounter,
    migrations_suppressed: IntCounter,
    policy_evaluation_errors: IntCounter,
}

impl TieringMetricsInner {
    fn new() -> Self {
        Self {
            collection_latency_seconds: register_histogram!(
                "tiering_collection_latency_seconds",
                "Time spent collecting and pricing the fleet",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_latency_seconds"),

            reconcile_latency_seconds: register_histogram!(
                "tiering_reconcile_latency_seconds",
                "Time spent in one lifecycle reconcile pass",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register reconcile_latency_seconds"),

            resources_observed: register_int_gauge!(
                "tiering_resources_observed",
                "Number of storage resources in the latest snapshot"
            )
            .expect("Failed to register resources_observed"),

            fleet_monthly_cost: register_gauge!(
                "tiering_fleet_monthly_cost",
                "Total monthly cost of the fleet"
            )
            .expect("Failed to register fleet_monthly_cost"),

            namespace_monthly_cost: register_gauge_vec!(
                "tiering_namespace_monthly_cost",
                "Monthly cost per namespace",
                &["namespace"]
            )
            .expect("Failed to register namespace_monthly_cost"),

            recommendations: register_int_gauge!(
                "tiering_recommendations",
                "Number of optimization recommendations in the latest snapshot"
            )
            .expect("Failed to register recommendations"),

            potential_savings: register_gauge!(
                "tiering_potential_monthly_savings",
                "Sum of monthly savings across current recommendations"
            )
            .expect("Failed to register potential_savings"),

            refresh_errors: register_int_counter!(
                "tiering_refresh_errors_total",
                "Total number of failed refresh cycles"
            )
            .expect("Failed to register refresh_errors"),

            migrations_submitted: register_int_counter!(
                "tiering_migrations_submitted_total",
                "Total number of migration requests accepted by the executor"
            )
            .expect("Failed to register migrations_submitted"),

            migrations_failed: register_int_counter!(
                "tiering_migrations_failed_total",
                "Total number of migration requests that failed"
            )
            .expect("Failed to register migrations_failed"),

            migrations_suppressed: register_int_counter!(
                "tiering_migrations_suppressed_total",
                "Total number of transitions skipped because they were already requested"
            )
            .expect("Failed to register migrations_suppressed"),

            policy_evaluation_errors: register_int_counter!(
                "tiering_policy_evaluation_errors_total",
                "Total number of tier evaluations that failed"
            )
            .expect("Failed to register policy_evaluation_errors"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct TieringMetrics {
    _private: (),
}

impl Default for TieringMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TieringMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(TieringMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &TieringMetricsInner {
        GLOBAL_METRICS.get_or_init(TieringMetricsInner::new)
    }

    pub fn observe_collection_latency(&self, duration_secs: f64) {
        self.inner().collection_latency_seconds.observe(duration_secs);
    }

    pub fn observe_reconcile_latency(&self, duration_secs: f64) {
        self.inner().reconcile_latency_seconds.observe(duration_secs);
    }

    /// Publish the headline numbers of a fresh snapshot
    pub fn record_snapshot(
        &self,
        resources: usize,
        monthly_cost: f64,
        by_namespace: &HashMap<String, f64>,
        recommendations: usize,
        potential_savings: f64,
    ) {
        let inner = self.inner();
        inner.resources_observed.set(resources as i64);
        inner.fleet_monthly_cost.set(monthly_cost);
        inner.recommendations.set(recommendations as i64);
        inner.potential_savings.set(potential_savings);

        // namespaces that vanished must not keep their last value
        inner.namespace_monthly_cost.reset();
        for (namespace, cost) in by_namespace {
            inner
                .namespace_monthly_cost
                .with_label_values(&[namespace.as_str()])
                .set(*cost);
        }
    }

    pub fn inc_refresh_errors(&self) {
        self.inner().refresh_errors.inc();
    }

    pub fn inc_migrations_submitted(&self) {
        self.inner().migrations_submitted.inc();
    }

    pub fn inc_migrations_failed(&self) {
        self.inner().migrations_failed.inc();
    }

    pub fn inc_migrations_suppressed(&self) {
        self.inner().migrations_suppressed.inc();
    }

    pub fn inc_policy_evaluation_errors(&self) {
        self.inner().policy_evaluation_errors.inc();
    }
}

/// Structured logger for lifecycle events
///
/// Every event carries a stable `event` field so log pipelines can
/// filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    cluster: String,
}

impl StructuredLogger {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
        }
    }

    pub fn log_startup(&self, version: &str, provider: &str, dry_run: bool) {
        info!(
            event = "agent_started",
            cluster = %self.cluster,
            agent_version = %version,
            provider = %provider,
            dry_run = dry_run,
            "Tiering agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            cluster = %self.cluster,
            reason = %reason,
            "Tiering agent shutting down"
        );
    }

    pub fn log_refresh_completed(
        &self,
        resources: usize,
        monthly_cost: f64,
        recommendations: usize,
        alerts: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "refresh_completed",
            cluster = %self.cluster,
            resources = resources,
            monthly_cost = monthly_cost,
            recommendations = recommendations,
            alerts = alerts,
            elapsed_ms = elapsed_ms as u64,
            "Snapshot refreshed"
        );
    }

    pub fn log_refresh_failed(&self, error: &str) {
        warn!(
            event = "refresh_failed",
            cluster = %self.cluster,
            error = %error,
            "Refresh failed, keeping previous snapshot"
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log_transition_proposed(
        &self,
        resource: &str,
        policy: &str,
        source: &str,
        current_class: &str,
        target_class: &str,
        target_tier: &str,
        confidence: f64,
        reason: &str,
    ) {
        info!(
            event = "transition_proposed",
            cluster = %self.cluster,
            resource = %resource,
            policy = %policy,
            source = %source,
            current_class = %current_class,
            target_class = %target_class,
            target_tier = %target_tier,
            confidence = confidence,
            reason = %reason,
            "Storage transition proposed"
        );
    }

    pub fn log_migration_submitted(&self, resource: &str, target_class: &str, workflow_id: &str) {
        info!(
            event = "migration_submitted",
            cluster = %self.cluster,
            resource = %resource,
            target_class = %target_class,
            workflow_id = %workflow_id,
            "Migration requested"
        );
    }

    pub fn log_migration_failed(&self, resource: &str, target_class: &str, error: &str) {
        warn!(
            event = "migration_failed",
            cluster = %self.cluster,
            resource = %resource,
            target_class = %target_class,
            error = %error,
            "Migration request failed, will re-evaluate next tick"
        );
    }

    pub fn log_migration_suppressed(&self, resource: &str, target_class: &str, requested_secs_ago: i64) {
        info!(
            event = "migration_suppressed",
            cluster = %self.cluster,
            resource = %resource,
            target_class = %target_class,
            requested_secs_ago = requested_secs_ago,
            "Migration already requested, skipping"
        );
    }

    pub fn log_policy_set_replaced(&self, previous: usize, current: usize) {
        info!(
            event = "policy_set_replaced",
            cluster = %self.cluster,
            previous = previous,
            current = current,
            "Lifecycle policy set replaced"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        // Prometheus registration is process-global; repeated handles share it
        let metrics = TieringMetrics::new();
        let again = TieringMetrics::new();

        metrics.observe_collection_latency(0.01);
        metrics.observe_reconcile_latency(0.002);
        metrics.record_snapshot(
            3,
            28.0,
            &HashMap::from([("default".to_string(), 28.0)]),
            2,
            7.5,
        );
        again.inc_refresh_errors();
        again.inc_migrations_submitted();
        again.inc_migrations_failed();
        again.inc_migrations_suppressed();
        again.inc_policy_evaluation_errors();

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "tiering_fleet_monthly_cost"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-cluster");
        assert_eq!(logger.cluster, "test-cluster");
    }
}
