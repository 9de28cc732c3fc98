//! Resource collection
//!
//! The pipeline enumerates resources from an inventory source and enriches
//! each one with batched usage, traffic and workload relationship lookups.
//! Enrichment runs on a bounded worker pool sized from the fleet size.

pub mod memory;
mod pipeline;

#[cfg(test)]
mod tests;

pub use pipeline::{CollectionConfig, CollectionPipeline};

use crate::models::{Policy, ResourceMetric, UsageSample, WorkloadAttachment};
use anyhow::Result;
use std::collections::HashMap;
use thiserror::Error;

pub use async_trait::async_trait;

/// Usage samples keyed by namespace, then resource name
pub type UsageMap = HashMap<String, HashMap<String, UsageSample>>;

/// Which part of the fleet to enumerate
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    All,
    Namespace(String),
}

impl Scope {
    pub fn includes(&self, namespace: &str) -> bool {
        match self {
            Scope::All => true,
            Scope::Namespace(ns) => ns == namespace,
        }
    }
}

/// Source of resource, policy and relationship inventory
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// List resources with every attribute except cost and usage
    async fn list_resources(&self, scope: &Scope) -> Result<Vec<ResourceMetric>>;

    /// The current lifecycle policy set, in match order
    async fn list_policies(&self) -> Result<Vec<Policy>>;

    /// Workloads mounting each claim
    async fn list_attachments(&self) -> Result<Vec<WorkloadAttachment>>;
}

/// Batched usage telemetry, fetched once per cycle
#[async_trait]
pub trait UsageSource: Send + Sync {
    async fn get_all_usage(&self) -> Result<UsageMap>;
}

/// Batched traffic counters keyed by correlation key (namespace)
#[async_trait]
pub trait TrafficSource: Send + Sync {
    async fn get_traffic_by_key(&self) -> Result<HashMap<String, u64>>;
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("{source_name} unavailable: {source}")]
    Upstream {
        source_name: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("collection cancelled")]
    Cancelled,

    #[error("collection workers exited early: received {received} of {expected} results")]
    WorkerLost { expected: usize, received: usize },
}

impl CollectError {
    pub(crate) fn upstream(source_name: &'static str, source: anyhow::Error) -> Self {
        CollectError::Upstream {
            source_name,
            source,
        }
    }
}
