//! Policy-driven lifecycle control
//!
//! The controller matches resources to policies, picks a target from the
//! intelligent recommender or the policy tiers, and requests migrations
//! through an external executor.

mod controller;
mod migration;
mod recommender;

#[cfg(test)]
mod tests;

pub use controller::{
    LifecycleController, ReconcileReport, TransitionOutcome, DEFAULT_RECONCILE_INTERVAL,
};
pub use migration::{
    DryRunExecutor, MigrationError, MigrationExecutor, MigrationRequest, RequestLedger,
    DEFAULT_REQUEST_COOLDOWN_SECS,
};
pub use recommender::{
    IntelligentRecommender, Proposal, ProposalKind, RecommenderConfig, UsageHistorySource,
};
