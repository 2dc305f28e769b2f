//! Tier 3: global supervision
//!
//! - Registry of sites with performance scores
//! - Shared resource pools
//! - Escalation and conflict arbitration

pub mod arbitration;
pub mod config;
pub mod registry;
pub mod resources;
pub mod supervisor;

pub use arbitration::{resolve_contention, resolve_escalation, Resolution, SideEffect};
pub use config::SupervisorConfig;
pub use registry::{performance_score, SiteRecord, SiteRegistry, INITIAL_SCORE};
pub use resources::ResourceLedger;
pub use supervisor::{GlobalSupervisor, SupervisorSnapshot};
