pub mod agent;
pub mod bus;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod sim;
pub mod site;
pub mod supervisor;
pub mod unit;

pub use agent::{Agent, Tier};
pub use bus::{AgentContext, Directory, DirectoryBuilder, Outbox};
pub use config::AppConfig;
pub use error::{PlantError, Result};
pub use protocol::{Content, Envelope, Performative};
pub use sim::{Plant, TaskGenerator, TelemetryMonitor, TransportService};
pub use site::SiteCoordinator;
pub use supervisor::GlobalSupervisor;
pub use unit::UnitAgent;
