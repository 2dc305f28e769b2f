//! Global Supervisor Configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{ENERGY, PROCESSING, TRANSPORT};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Conflict queue drain period (ms)
    pub conflict_period_ms: u64,
    /// Systemic analysis period (ms)
    pub analysis_period_ms: u64,
    /// Strategic planning period (ms)
    pub planning_period_ms: u64,
    /// Global report period (ms)
    pub report_period_ms: u64,
    /// Shared pools and their totals
    pub pools: BTreeMap<String, u32>,
    /// Reallocation / load-distribution candidates must be below this load (%)
    pub candidate_load: f64,
    /// Resource donors must be below this load (%)
    pub donor_load: f64,
    /// Amount moved by an orchestrated transfer for NO_RESOURCES escalations
    pub transfer_amount: u32,
    /// Resource moved for NO_RESOURCES escalations
    pub transfer_resource: String,
    /// Global weighted average above which every site is told to reduce load (%)
    pub reduce_load_threshold: f64,
    /// Max-min site load spread that triggers rebalancing (%)
    pub imbalance_spread: f64,
    /// Cumulative escalations above which maintenance is advised
    pub maintenance_escalations: u64,
    /// Pool utilisation warning level (0-1)
    pub pool_warning_utilization: f64,
    /// Score assumed for sites without one during contention
    pub unknown_score: u8,
    /// Global average above which planning flags a rising trend (%)
    pub planning_trend_load: f64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        let mut pools = BTreeMap::new();
        pools.insert(ENERGY.to_string(), 10_000);
        pools.insert(TRANSPORT.to_string(), 100);
        pools.insert(PROCESSING.to_string(), 500);

        Self {
            conflict_period_ms: 4_000,
            analysis_period_ms: 8_000,
            planning_period_ms: 15_000,
            report_period_ms: 10_000,
            pools,
            candidate_load: 70.0,
            donor_load: 50.0,
            transfer_amount: 50,
            transfer_resource: PROCESSING.to_string(),
            reduce_load_threshold: 85.0,
            imbalance_spread: 40.0,
            maintenance_escalations: 5,
            pool_warning_utilization: 0.9,
            unknown_score: 50,
            planning_trend_load: 70.0,
        }
    }
}
