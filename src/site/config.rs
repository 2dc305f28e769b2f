//! Site Coordinator Configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Load-average recomputation period (ms)
    pub monitor_period_ms: u64,
    /// SITE_STATUS report period (ms)
    pub report_period_ms: u64,
    /// Local conflict scan period (ms)
    pub conflict_period_ms: u64,
    /// Warn when the site load average exceeds this (%)
    pub alert_load: f64,
    /// A replacement unit must be below this load (%)
    pub replacement_load: f64,
    /// A redistribution target must be below this load (%)
    pub balance_target_load: f64,
    /// Local conflict scan: overloaded above (%)
    pub overloaded_load: f64,
    /// Local conflict scan: underloaded below (%)
    pub underloaded_load: f64,
    /// How long a THROTTLE / REDUCE_LOAD directive keeps forwarded work out (ms)
    pub throttle_window_ms: u64,
    /// Advisory directives kept for reports
    pub advisory_history: usize,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            monitor_period_ms: 5_000,
            report_period_ms: 7_000,
            conflict_period_ms: 6_000,
            alert_load: 85.0,
            replacement_load: 60.0,
            balance_target_load: 70.0,
            overloaded_load: 80.0,
            underloaded_load: 30.0,
            throttle_window_ms: 30_000,
            advisory_history: 64,
        }
    }
}
