//! Migration requests and the request ledger

use crate::models::{OptimizationRecommendation, ResourceMetric};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::info;

/// How long an identical request stays suppressed
pub const DEFAULT_REQUEST_COOLDOWN_SECS: i64 = 24 * 3600;

/// What the executor is asked to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub target_class: String,
    pub target_size: String,
    pub target_tier: String,
}

impl From<&OptimizationRecommendation> for MigrationRequest {
    fn from(rec: &OptimizationRecommendation) -> Self {
        Self {
            target_class: rec.target_class.clone(),
            target_size: rec.target_size.clone(),
            target_tier: rec.target_tier.clone(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum MigrationError {
    #[error("migration backend unavailable: {0}")]
    Unavailable(String),

    #[error("migration rejected: {0}")]
    Rejected(String),
}

/// Submits data movement to an external workflow engine.
///
/// Fire-and-forget: the returned identifier is recorded, completion is not
/// polled.
#[async_trait]
pub trait MigrationExecutor: Send + Sync {
    async fn trigger_migration(
        &self,
        resource: &ResourceMetric,
        request: &MigrationRequest,
    ) -> Result<String, MigrationError>;
}

/// Logs requests instead of submitting them
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    submitted: AtomicU64,
}

impl DryRunExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MigrationExecutor for DryRunExecutor {
    async fn trigger_migration(
        &self,
        resource: &ResourceMetric,
        request: &MigrationRequest,
    ) -> Result<String, MigrationError> {
        let seq = self.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        let workflow_id = format!("dry-run-{}-{}", resource.name, seq);

        info!(
            resource = %resource.key(),
            target_class = %request.target_class,
            target_size = %request.target_size,
            target_tier = %request.target_tier,
            workflow_id = %workflow_id,
            "Dry run: migration not submitted"
        );

        Ok(workflow_id)
    }
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    request: MigrationRequest,
    requested_at: DateTime<Utc>,
}

/// Successful requests per resource, used to request each decision once.
///
/// An identical request younger than the cooldown is suppressed. A different
/// request, or an expired entry, goes through again. Clearing an entry when the
/// resource stops proposing anything lets a later re-eligibility through.
#[derive(Debug)]
pub struct RequestLedger {
    entries: DashMap<String, LedgerEntry>,
    cooldown: Duration,
}

impl Default for RequestLedger {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_REQUEST_COOLDOWN_SECS))
    }
}

impl RequestLedger {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Age of the matching live entry, if this request should be skipped
    pub fn suppressed_for(
        &self,
        key: &str,
        request: &MigrationRequest,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let entry = self.entries.get(key)?;
        let age = now - entry.requested_at;
        (entry.request == *request && age < self.cooldown).then_some(age)
    }

    pub fn record(&self, key: &str, request: MigrationRequest, now: DateTime<Utc>) {
        self.entries.insert(
            key.to_string(),
            LedgerEntry {
                request,
                requested_at: now,
            },
        );
    }

    pub fn clear(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop entries past the cooldown
    pub fn prune(&self, now: DateTime<Utc>) {
        self.entries
            .retain(|_, entry| now - entry.requested_at < self.cooldown);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(class: &str) -> MigrationRequest {
        MigrationRequest {
            target_class: class.to_string(),
            target_size: "100Gi".to_string(),
            target_tier: "warm".to_string(),
        }
    }

    #[test]
    fn test_identical_request_suppressed_within_cooldown() {
        let ledger = RequestLedger::new(Duration::hours(1));
        let now = Utc::now();
        ledger.record("c/ns/a", request("st1"), now);

        let age = ledger.suppressed_for("c/ns/a", &request("st1"), now + Duration::minutes(10));
        assert_eq!(age, Some(Duration::minutes(10)));

        assert!(ledger
            .suppressed_for("c/ns/a", &request("st1"), now + Duration::hours(2))
            .is_none());
    }

    #[test]
    fn test_different_request_goes_through() {
        let ledger = RequestLedger::default();
        let now = Utc::now();
        ledger.record("c/ns/a", request("st1"), now);

        assert!(ledger.suppressed_for("c/ns/a", &request("sc1"), now).is_none());
        assert!(ledger.suppressed_for("c/ns/b", &request("st1"), now).is_none());
    }

    #[test]
    fn test_clear_and_prune() {
        let ledger = RequestLedger::new(Duration::hours(1));
        let now = Utc::now();
        ledger.record("a", request("st1"), now);
        ledger.record("b", request("st1"), now - Duration::hours(3));

        ledger.prune(now);
        assert_eq!(ledger.len(), 1);

        ledger.clear("a");
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_ids() {
        let executor = DryRunExecutor::new();
        let r = ResourceMetric::new("data", "ns", "gp3", 0);

        let first = executor.trigger_migration(&r, &request("st1")).await.unwrap();
        let second = executor.trigger_migration(&r, &request("st1")).await.unwrap();
        assert_eq!(first, "dry-run-data-1");
        assert_eq!(second, "dry-run-data-2");
        assert_eq!(executor.submitted(), 2);
    }
}
