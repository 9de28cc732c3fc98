//! Tiering Agent - storage cost and lifecycle engine
//!
//! Runs next to the cluster control plane, periodically pricing every
//! persistent volume, publishing a cost snapshot and driving policy-based
//! storage tier transitions.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tiering_agent::{api, config::AgentConfig};
use tiering_core::{
    collector::{
        memory::{demo_fleet, load_policy_document},
        CollectionPipeline,
    },
    cost::{CostEngine, Optimizer},
    health::HealthRegistry,
    lifecycle::{
        DryRunExecutor, IntelligentRecommender, LifecycleController, RecommenderConfig,
        RequestLedger,
    },
    observability::{StructuredLogger, TieringMetrics},
    predictor::{LinearTrendForecaster, ScoredPlacement},
    pricing::StaticPricingOracle,
    refresh::RefreshLoopBuilder,
    store::SnapshotStore,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting tiering-agent");

    let config = AgentConfig::load()?;
    let provider = config.provider();
    info!(
        cluster = %config.cluster_name,
        provider = %provider,
        dry_run = config.dry_run,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = TieringMetrics::new();
    let logger = StructuredLogger::new(&config.cluster_name);
    logger.log_startup(AGENT_VERSION, provider.as_str(), config.dry_run);

    // Collaborators: the bundled fleet, with policies optionally read from disk
    let fleet = demo_fleet(Utc::now());
    let mut inventory = fleet.inventory;
    let mut budgets = Vec::new();
    if let Some(path) = &config.policy_file {
        let document = load_policy_document(path)
            .await
            .with_context(|| format!("Failed to load policy file {}", path.display()))?;
        info!(
            path = %path.display(),
            policies = document.policies.len(),
            budgets = document.budgets.len(),
            "Loaded policy document"
        );
        budgets = document.budgets;
        inventory = inventory.with_policy_file(path.clone());
    }

    let pipeline = CollectionPipeline::new(Arc::new(inventory), Arc::new(fleet.usage))
        .with_traffic(Arc::new(fleet.traffic));

    let placement = Arc::new(ScoredPlacement::with_defaults());
    let optimizer = Optimizer::new(
        CostEngine::new(Arc::new(StaticPricingOracle::default())),
        Arc::new(LinearTrendForecaster::new()),
        placement.clone(),
    );

    let recommender = IntelligentRecommender::new(placement).with_config(RecommenderConfig {
        fleet_provider: provider,
        ..RecommenderConfig::default()
    });
    let mut controller = LifecycleController::new(recommender, logger.clone())
        .with_ledger(RequestLedger::new(config.migration_cooldown()?))
        .with_interval(config.reconcile_interval())
        .with_health(health_registry.clone());
    if config.dry_run {
        controller = controller.with_executor(Arc::new(DryRunExecutor::new()));
    } else {
        warn!("No migration executor available, transitions will only be logged");
    }
    let controller = Arc::new(controller);

    let store = Arc::new(SnapshotStore::new());
    let refresh = RefreshLoopBuilder::new()
        .pipeline(pipeline)
        .optimizer(optimizer)
        .store(store.clone())
        .controller(controller.clone())
        .budgets(budgets)
        .health(health_registry.clone())
        .logger(logger.clone())
        .interval(config.refresh_interval())
        .scope(config.scope())
        .provider(provider)
        .build()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresh_handle = tokio::spawn(refresh.run(shutdown_rx.clone()));

    let controller_handle = {
        let store = store.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            controller
                .start(shutdown, move || {
                    let store = store.clone();
                    async move { store.resources().await }
                })
                .await;
        })
    };

    // Start health, metrics and snapshot server
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics, store));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    let _ = shutdown_tx.send(true);
    let _ = refresh_handle.await;
    let _ = controller_handle.await;
    api_handle.abort();

    info!("Shutting down");

    Ok(())
}
