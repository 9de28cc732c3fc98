//! Storage pricing oracle
//!
//! Maps (provider, storage class, region) to per-unit prices. Lookups never
//! fail: an unknown class falls back to the provider default row and an
//! unknown provider falls back to the global default.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Cloud provider a storage class belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Gcp,
    Azure,
    Unknown,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Gcp => "gcp",
            Provider::Azure => "azure",
            Provider::Unknown => "unknown",
        }
    }

    fn class_prefix(&self) -> Option<&'static str> {
        match self {
            Provider::Aws => Some("aws-"),
            Provider::Gcp => Some("gcp-"),
            Provider::Azure => Some("azure-"),
            Provider::Unknown => None,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = std::convert::Infallible;

    /// Unrecognised names map to `Unknown` rather than failing
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Provider::Aws,
            "gcp" | "gce" => Provider::Gcp,
            "azure" => Provider::Azure,
            _ => Provider::Unknown,
        })
    }
}

/// Parse a provider name, mapping anything unrecognised to `Unknown`
pub fn parse_provider(name: &str) -> Provider {
    name.parse().unwrap_or(Provider::Unknown)
}

/// Split a provider-prefixed class name into (provider, base class).
///
/// `"aws-gp3"` becomes `(Aws, "gp3")`; a class without a recognised prefix
/// comes back untouched with `Unknown`.
pub fn normalize_storage_class(class: &str) -> (Provider, &str) {
    for provider in [Provider::Aws, Provider::Gcp, Provider::Azure] {
        if let Some(prefix) = provider.class_prefix() {
            if let Some(base) = class.strip_prefix(prefix) {
                if !base.is_empty() {
                    return (provider, base);
                }
            }
        }
    }
    (Provider::Unknown, class)
}

/// Resolve the provider and base class used to price a resource.
///
/// A prefix on the class name wins over the configured provider.
pub fn resolve_class(provider: Provider, class: &str) -> (Provider, &str) {
    match normalize_storage_class(class) {
        (Provider::Unknown, base) => (provider, base),
        resolved => resolved,
    }
}

/// Per-unit pricing for one storage class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoragePricing {
    /// Price per GiB per month
    pub per_unit_month: f64,
    /// Price per IOPS above the baseline, when provisioned
    pub per_iops: f64,
    pub provisioned_iops: bool,
}

impl StoragePricing {
    pub const fn flat(per_unit_month: f64) -> Self {
        Self {
            per_unit_month,
            per_iops: 0.0,
            provisioned_iops: false,
        }
    }

    pub const fn provisioned(per_unit_month: f64, per_iops: f64) -> Self {
        Self {
            per_unit_month,
            per_iops,
            provisioned_iops: true,
        }
    }
}

/// Immutable pricing configuration handed to the oracle at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingTable {
    classes: HashMap<Provider, HashMap<String, StoragePricing>>,
    provider_defaults: HashMap<Provider, StoragePricing>,
    global_default: StoragePricing,
}

impl PricingTable {
    pub fn new(global_default: StoragePricing) -> Self {
        Self {
            classes: HashMap::new(),
            provider_defaults: HashMap::new(),
            global_default,
        }
    }

    pub fn with_class(
        mut self,
        provider: Provider,
        class: impl Into<String>,
        pricing: StoragePricing,
    ) -> Self {
        self.classes
            .entry(provider)
            .or_default()
            .insert(class.into(), pricing);
        self
    }

    pub fn with_provider_default(mut self, provider: Provider, pricing: StoragePricing) -> Self {
        self.provider_defaults.insert(provider, pricing);
        self
    }

    /// Exact match, then provider default, then global default
    pub fn lookup(&self, provider: Provider, class: &str) -> StoragePricing {
        self.classes
            .get(&provider)
            .and_then(|classes| classes.get(class))
            .or_else(|| self.provider_defaults.get(&provider))
            .copied()
            .unwrap_or(self.global_default)
    }
}

impl Default for PricingTable {
    /// Approximate list prices (USD, early 2026)
    fn default() -> Self {
        use Provider::*;
        use StoragePricing as P;

        PricingTable::new(P::flat(0.10))
            // AWS EBS
            .with_class(Aws, "gp3", P::provisioned(0.08, 0.005))
            .with_class(Aws, "gp2", P::flat(0.10))
            .with_class(Aws, "io1", P::provisioned(0.125, 0.065))
            .with_class(Aws, "io2", P::provisioned(0.125, 0.065))
            .with_class(Aws, "st1", P::flat(0.045))
            .with_class(Aws, "sc1", P::flat(0.025))
            .with_provider_default(Aws, P::flat(0.10))
            // GCP persistent disk
            .with_class(Gcp, "standard", P::flat(0.04))
            .with_class(Gcp, "pd-standard", P::flat(0.04))
            .with_class(Gcp, "balanced", P::flat(0.10))
            .with_class(Gcp, "pd-balanced", P::flat(0.10))
            .with_class(Gcp, "ssd", P::flat(0.17))
            .with_class(Gcp, "pd-ssd", P::flat(0.17))
            .with_class(Gcp, "pd-extreme", P::provisioned(0.125, 0.05))
            .with_provider_default(Gcp, P::flat(0.10))
            // Azure managed disks
            .with_class(Azure, "standard", P::flat(0.045))
            .with_class(Azure, "standard-hdd", P::flat(0.045))
            .with_class(Azure, "standard-ssd", P::flat(0.075))
            .with_class(Azure, "premium", P::flat(0.12))
            .with_class(Azure, "managed-premium", P::flat(0.12))
            .with_class(Azure, "premium-v2", P::provisioned(0.08, 0.005))
            .with_class(Azure, "ultra", P::provisioned(0.15, 0.10))
            .with_provider_default(Azure, P::flat(0.075))
    }
}

/// Source of storage prices
pub trait PricingOracle: Send + Sync {
    /// Never fails; falls back to provider and then global defaults
    fn get_price(&self, provider: Provider, storage_class: &str, region: &str) -> StoragePricing;
}

/// Oracle backed by a fixed [`PricingTable`]; region is not differentiated
#[derive(Debug, Clone, Default)]
pub struct StaticPricingOracle {
    table: PricingTable,
}

impl StaticPricingOracle {
    pub fn new(table: PricingTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PricingTable {
        &self.table
    }
}

impl PricingOracle for StaticPricingOracle {
    fn get_price(&self, provider: Provider, storage_class: &str, _region: &str) -> StoragePricing {
        let (provider, class) = resolve_class(provider, storage_class);
        self.table.lookup(provider, class)
    }
}
