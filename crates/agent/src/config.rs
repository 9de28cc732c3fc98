//! Agent configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tiering_core::collector::Scope;
use tiering_core::pricing::{parse_provider, Provider};

/// Agent configuration, read from `TIERING_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Cluster name stamped on structured log events
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Cloud provider the fleet is priced under
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Restrict collection to one namespace
    #[serde(default)]
    pub namespace: Option<String>,

    /// API server port for health/metrics and snapshot reads
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Snapshot refresh interval in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Lifecycle reconcile interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// JSON policy document, re-read on every refresh
    #[serde(default)]
    pub policy_file: Option<PathBuf>,

    /// How long an identical migration request is suppressed
    #[serde(default = "default_migration_cooldown")]
    pub migration_cooldown_secs: u64,

    /// Submit migrations to the dry-run executor instead of only logging them
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

fn default_cluster_name() -> String {
    std::env::var("CLUSTER_NAME").unwrap_or_else(|_| "default-cluster".to_string())
}

fn default_provider() -> String {
    "aws".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_refresh_interval() -> u64 {
    60
}

fn default_reconcile_interval() -> u64 {
    300
}

fn default_migration_cooldown() -> u64 {
    24 * 3600
}

fn default_dry_run() -> bool {
    true
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("TIERING").try_parsing(true))
            .build()
            .context("Failed to read TIERING_ environment")?;

        config
            .try_deserialize()
            .context("Invalid TIERING_ configuration")
    }

    pub fn provider(&self) -> Provider {
        parse_provider(&self.provider)
    }

    pub fn scope(&self) -> Scope {
        match &self.namespace {
            Some(ns) if !ns.is_empty() => Scope::Namespace(ns.clone()),
            _ => Scope::All,
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }

    pub fn migration_cooldown(&self) -> Result<chrono::Duration> {
        i64::try_from(self.migration_cooldown_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .with_context(|| {
                format!(
                    "TIERING_MIGRATION_COOLDOWN_SECS out of range: {}",
                    self.migration_cooldown_secs
                )
            })
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            provider: default_provider(),
            namespace: None,
            api_port: default_api_port(),
            refresh_interval_secs: default_refresh_interval(),
            reconcile_interval_secs: default_reconcile_interval(),
            policy_file: None,
            migration_cooldown_secs: default_migration_cooldown(),
            dry_run: default_dry_run(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.provider(), Provider::Aws);
        assert_eq!(config.scope(), Scope::All);
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.reconcile_interval(), Duration::from_secs(300));
        assert_eq!(
            config.migration_cooldown().unwrap(),
            chrono::Duration::hours(24)
        );
        assert!(config.dry_run);
    }

    #[test]
    fn test_empty_source_uses_serde_defaults() {
        let config: AgentConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.api_port, 8080);
        assert!(config.policy_file.is_none());
    }

    #[test]
    fn test_oversized_cooldown_is_an_error() {
        let config = AgentConfig {
            migration_cooldown_secs: u64::MAX,
            ..AgentConfig::default()
        };
        assert!(config.migration_cooldown().is_err());

        let config = AgentConfig {
            migration_cooldown_secs: i64::MAX as u64,
            ..AgentConfig::default()
        };
        assert!(config.migration_cooldown().is_err());
    }

    #[test]
    fn test_namespace_scope() {
        let config = AgentConfig {
            namespace: Some("prod".to_string()),
            provider: "GCP".to_string(),
            ..AgentConfig::default()
        };
        assert_eq!(config.scope(), Scope::Namespace("prod".to_string()));
        assert_eq!(config.provider(), Provider::Gcp);
    }
}
