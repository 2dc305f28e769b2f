//! Simulation collaborators and plant bootstrap
//!
//! - `TaskGenerator`: synthetic workload
//! - `TelemetryMonitor`: passive gossip dashboard
//! - `TransportService`: shipping of finished products
//! - `Plant`: spawns the whole hierarchy from configuration

pub mod config;
pub mod generator;
pub mod monitor;
pub mod plant;
pub mod transport;

pub use config::{GeneratorConfig, MonitorConfig, TransportConfig};
pub use generator::{GeneratorStats, TaskGenerator};
pub use monitor::{Telemetry, TelemetryMonitor};
pub use plant::Plant;
pub use transport::{TransportService, TransportSnapshot};
