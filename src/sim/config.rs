//! Collaborator Configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub enabled: bool,
    /// One random task every period (ms)
    pub task_period_ms: u64,
    /// Burst period (ms)
    pub burst_period_ms: u64,
    /// Burst size range, inclusive min / exclusive max
    pub burst_min: u32,
    pub burst_max: u32,
    /// Complex task (call for proposals) period (ms); 0 disables
    pub cfp_period_ms: u64,
    /// How long proposals are collected before the award (ms)
    pub cfp_window_ms: u64,
    /// Inter-site task period (ms); 0 disables
    pub inter_site_period_ms: u64,
    /// Statistics log period (ms)
    pub stats_period_ms: u64,
    /// Priority used when retrying a refused task
    pub retry_priority: u8,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            task_period_ms: 3_000,
            burst_period_ms: 20_000,
            burst_min: 5,
            burst_max: 15,
            cfp_period_ms: 12_000,
            cfp_window_ms: 1_000,
            inter_site_period_ms: 9_000,
            stats_period_ms: 15_000,
            retry_priority: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Dashboard period (ms)
    pub dashboard_period_ms: u64,
    /// Entries not refreshed within this window are evicted (ms)
    pub stale_after_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dashboard_period_ms: 5_000,
            stale_after_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub enabled: bool,
    /// Concurrent transports
    pub capacity: u32,
    /// One in-flight transport completes per tick (ms)
    pub drain_period_ms: u64,
    /// Quoted transport time (s)
    pub estimated_secs: u64,
    pub failure_probability: f64,
    pub recovery_probability: f64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 20,
            drain_period_ms: 3_000,
            estimated_secs: 5,
            failure_probability: 0.02,
            recovery_probability: 0.10,
        }
    }
}
