//! Storage cost and tiering engine
//!
//! This crate provides the core functionality for:
//! - Pricing persistent volumes across cloud providers
//! - Cost summaries, budgets and spike alerts
//! - Ranked optimization recommendations
//! - Policy-driven lifecycle transitions
//! - Health checks and observability

pub mod anomaly;
pub mod collector;
pub mod cost;
pub mod governance;
pub mod health;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod policy;
pub mod predictor;
pub mod pricing;
pub mod refresh;
pub mod store;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, TieringMetrics};
pub use store::{Snapshot, SnapshotStore};
