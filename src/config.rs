use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::domain::{UnitSpec, UnitType};
use crate::sim::{GeneratorConfig, MonitorConfig, TransportConfig};
use crate::site::SiteConfig;
use crate::supervisor::SupervisorConfig;
use crate::unit::UnitConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Seed for every random draw; unset means entropy
    pub seed: Option<u64>,
    pub logging: LoggingConfig,
    pub bus: BusConfig,
    pub unit: UnitConfig,
    pub site: SiteConfig,
    pub supervisor: SupervisorConfig,
    pub generator: GeneratorConfig,
    pub monitor: MonitorConfig,
    pub transport: TransportConfig,
    pub topology: TopologyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bounded mailbox size per agent; a full mailbox drops the message
    pub mailbox_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
        }
    }
}

/// Static plant layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub sites: Vec<String>,
    pub units: Vec<UnitSpec>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        let unit = |id: &str, unit_type, site: &str, capacity, cycle_time_ms, energy| UnitSpec {
            id: id.to_string(),
            unit_type,
            site: site.to_string(),
            capacity,
            cycle_time_ms,
            energy,
            neighbors: Vec::new(),
        };
        Self {
            sites: vec!["A".to_string(), "B".to_string()],
            units: vec![
                unit("M1", UnitType::Distribution, "A", 10, 2_000, 50.0),
                unit("M2", UnitType::Machining, "A", 8, 5_000, 100.0),
                unit("M3", UnitType::Assembly, "B", 12, 3_000, 80.0),
                unit("M4", UnitType::QualityControl, "B", 15, 2_000, 60.0),
            ],
        }
    }
}

impl TopologyConfig {
    /// Unit specs with empty neighbor lists expanded to every other unit
    pub fn resolved_units(&self) -> Vec<UnitSpec> {
        self.units
            .iter()
            .map(|spec| {
                let mut spec = spec.clone();
                if spec.neighbors.is_empty() {
                    spec.neighbors = self
                        .units
                        .iter()
                        .filter(|other| other.id != spec.id)
                        .map(|other| other.id.clone())
                        .collect();
                }
                spec
            })
            .collect()
    }

    pub fn unit_ids(&self) -> Vec<String> {
        self.units.iter().map(|u| u.id.clone()).collect()
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("bus.mailbox_capacity", 256)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/demo.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("AUTOPLANT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (AUTOPLANT_UNIT__HIGH_WATER_LOAD, etc.)
            .add_source(
                Environment::with_prefix("AUTOPLANT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let probabilities = [
            ("unit.failure_probability", self.unit.failure_probability),
            ("unit.recovery_probability", self.unit.recovery_probability),
            ("transport.failure_probability", self.transport.failure_probability),
            ("transport.recovery_probability", self.transport.recovery_probability),
            ("supervisor.pool_warning_utilization", self.supervisor.pool_warning_utilization),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                errors.push(format!("{name} must be between 0 and 1, got {p}"));
            }
        }

        if self.bus.mailbox_capacity == 0 {
            errors.push("bus.mailbox_capacity must be positive".to_string());
        }
        if self.transport.capacity == 0 {
            errors.push("transport.capacity must be positive".to_string());
        }
        if self.generator.burst_min > self.generator.burst_max {
            errors.push("generator.burst_min must not exceed generator.burst_max".to_string());
        }
        if self.supervisor.pools.values().any(|&total| total == 0) {
            errors.push("supervisor.pools must all be positive".to_string());
        }

        if self.topology.sites.is_empty() {
            errors.push("topology.sites must not be empty".to_string());
        }
        let mut sites = HashSet::new();
        for site in &self.topology.sites {
            if !sites.insert(site.as_str()) {
                errors.push(format!("duplicate site {site}"));
            }
        }

        let mut ids = HashSet::new();
        for unit in &self.topology.units {
            if !ids.insert(unit.id.as_str()) {
                errors.push(format!("duplicate unit id {}", unit.id));
            }
            if unit.capacity == 0 {
                errors.push(format!("unit {} capacity must be positive", unit.id));
            }
            if !sites.contains(unit.site.as_str()) {
                errors.push(format!("unit {} belongs to undeclared site {}", unit.id, unit.site));
            }
        }
        for unit in &self.topology.units {
            for neighbor in &unit.neighbors {
                if !ids.contains(neighbor.as_str()) {
                    errors.push(format!("unit {} has unknown neighbor {neighbor}", unit.id));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.topology.units.len(), 4);
        assert_eq!(config.bus.mailbox_capacity, 256);
    }

    #[test]
    fn test_empty_neighbors_resolve_to_all_others() {
        let topology = TopologyConfig::default();
        let units = topology.resolved_units();
        assert_eq!(units[0].neighbors, vec!["M2", "M3", "M4"]);
        assert_eq!(units[3].neighbors, vec!["M1", "M2", "M3"]);
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = AppConfig::default();
        config.unit.failure_probability = 1.5;
        config.topology.units[1].id = "M1".to_string();
        config.topology.units[2].site = "Z".to_string();
        config.topology.units[3].neighbors = vec!["M9".to_string()];

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4, "{errors:?}");
        assert!(errors.iter().any(|e| e.contains("failure_probability")));
        assert!(errors.iter().any(|e| e.contains("duplicate unit id M1")));
        assert!(errors.iter().any(|e| e.contains("undeclared site Z")));
        assert!(errors.iter().any(|e| e.contains("unknown neighbor M9")));
    }

    #[test]
    fn test_load_from_reads_toml_over_defaults() {
        let dir = std::env::temp_dir().join(format!("autoplant-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            "seed = 7\n\n[unit]\nhigh_water_load = 80.0\n\n[site]\nthrottle_window_ms = 1000\n",
        )
        .unwrap();

        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.unit.high_water_load, 80.0);
        assert_eq!(config.unit.override_priority, 7);
        assert_eq!(config.site.throttle_window_ms, 1000);
        assert_eq!(config.topology.sites, vec!["A", "B"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
