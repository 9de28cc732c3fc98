//! Cost and optimization engines
//!
//! The calculator turns resource attributes into money and builds fleet
//! summaries; the optimizer runs independent detectors over priced resources
//! and ranks the findings by savings.

mod calculator;
mod optimizer;

pub use calculator::{
    CostEngine, BASELINE_IOPS, CROSS_PROVIDER_EGRESS_PER_GIB, DEFAULT_REGION, DEFAULT_TOP_N,
    HOURS_PER_MONTH, INTER_REGION_EGRESS_PER_GIB,
};
pub use optimizer::{CrossProviderTarget, Optimizer, OptimizerConfig};

use crate::models::BYTES_PER_GIB;

pub fn format_cost(cost: f64) -> String {
    format!("${:.2}", cost)
}

pub fn format_cost_per_month(cost: f64) -> String {
    format!("${:.2}/mo", cost)
}

pub fn format_cost_per_year(monthly: f64) -> String {
    format!("${:.2}/yr", monthly * 12.0)
}

/// Render a byte count as a storage quantity (`100Gi`, `512Mi`, or raw bytes)
pub fn format_quantity(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    if bytes >= BYTES_PER_GIB {
        format!("{}Gi", bytes / BYTES_PER_GIB)
    } else if bytes >= MIB {
        format!("{}Mi", bytes / MIB)
    } else {
        bytes.to_string()
    }
}
