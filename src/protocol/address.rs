//! Flat mailbox names used across the hierarchy

pub const SUPERVISOR: &str = "GlobalSupervisor";
pub const MONITOR: &str = "SystemMonitor";
pub const GENERATOR: &str = "TaskGenerator";
pub const TRANSPORT: &str = "TransportCoordinator";

const COORDINATOR_PREFIX: &str = "SiteCoordinator_";

/// Mailbox name of the coordinator for `site`
pub fn coordinator(site: &str) -> String {
    format!("{COORDINATOR_PREFIX}{site}")
}

/// Inverse of [`coordinator`]
pub fn site_of_coordinator(name: &str) -> Option<&str> {
    name.strip_prefix(COORDINATOR_PREFIX)
        .filter(|site| !site.is_empty())
}
