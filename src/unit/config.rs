//! Unit Agent Configuration

use serde::{Deserialize, Serialize};

/// Tunables shared by every unit agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Self-monitoring period (ms): failure/recovery draws, overload check, status push
    pub monitor_period_ms: u64,
    /// Decision-cycle period (ms): load-balance request or help offer
    pub decision_period_ms: u64,
    /// Gossip period (ms)
    pub gossip_period_ms: u64,
    /// Local optimisation logging period (ms)
    pub optimize_period_ms: u64,
    /// Probability of a self-detected failure per monitoring tick
    pub failure_probability: f64,
    /// Probability of self-repair per monitoring tick while failed
    pub recovery_probability: f64,
    /// Admission refuses above this load (%)
    pub high_water_load: f64,
    /// A full queue still accepts tasks with priority strictly above this
    pub override_priority: u8,
    /// Above this load the unit asks its coordinator to rebalance (%)
    pub balance_request_load: f64,
    /// Below this load an operational unit offers help to its neighbors (%)
    pub help_offer_load: f64,
    /// Above this load an operational unit reports OVERLOAD (%)
    pub overload_load: f64,
    /// Minimum proposal score worth answering a call for proposals
    pub proposal_threshold: f64,
    /// Request transport for every finished task
    pub ship_completed: bool,
    /// Destination named in transport requests
    pub ship_destination: String,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            monitor_period_ms: 3_000,
            decision_period_ms: 2_000,
            gossip_period_ms: 3_000,
            optimize_period_ms: 5_000,
            failure_probability: 0.03,
            recovery_probability: 0.15,
            high_water_load: 90.0,
            override_priority: 7,
            balance_request_load: 85.0,
            help_offer_load: 30.0,
            overload_load: 95.0,
            proposal_threshold: 0.5,
            ship_completed: true,
            ship_destination: "WAREHOUSE".to_string(),
        }
    }
}
