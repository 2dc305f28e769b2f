//! Tier 2: site coordinators

pub mod config;
pub mod coordinator;
pub mod directory;

pub use config::SiteConfig;
pub use coordinator::{Advisory, SiteCoordinator, SiteSnapshot};
pub use directory::{UnitDirectory, UnitEntry};
