//! Plant bootstrap
//!
//! Builds the directory from the topology, then spawns one task per agent:
//! supervisor, one coordinator per site, one unit per spec and the enabled
//! collaborators. All share one broadcast shutdown.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info};

use crate::agent::Agent;
use crate::bus::{AgentContext, Directory, DirectoryBuilder};
use crate::config::AppConfig;
use crate::domain::UnitSpec;
use crate::error::{PlantError, Result};
use crate::protocol::address;
use crate::site::SiteCoordinator;
use crate::supervisor::GlobalSupervisor;
use crate::unit::{FailurePolicy, ProbabilisticPolicy, UnitAgent};

use super::generator::TaskGenerator;
use super::monitor::TelemetryMonitor;
use super::transport::TransportService;

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A running plant
pub struct Plant {
    directory: Directory,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl Plant {
    /// Launch with failure policies drawn from the configured probabilities
    pub fn launch(config: &AppConfig) -> Result<Self> {
        let seed = config.seed;
        let unit_config = config.unit.clone();
        let mut index = 0u64;
        Self::launch_with(config, move |_spec| {
            index += 1;
            Box::new(ProbabilisticPolicy::new(
                unit_config.failure_probability,
                unit_config.recovery_probability,
                seed.map(|s| s.wrapping_add(index)),
            ))
        })
    }

    /// Launch with a caller-chosen failure policy per unit
    pub fn launch_with<F>(config: &AppConfig, mut policy_for: F) -> Result<Self>
    where
        F: FnMut(&UnitSpec) -> Box<dyn FailurePolicy>,
    {
        config.validate().map_err(PlantError::InvalidConfig)?;

        let sites = &config.topology.sites;
        let units = config.topology.resolved_units();

        let mut builder = DirectoryBuilder::new(config.bus.mailbox_capacity);
        let supervisor_rx = builder.register(address::SUPERVISOR)?;
        let mut site_rxs = Vec::with_capacity(sites.len());
        for site in sites {
            site_rxs.push(builder.register(address::coordinator(site))?);
        }
        let mut unit_rxs = Vec::with_capacity(units.len());
        for unit in &units {
            unit_rxs.push(builder.register(unit.id.clone())?);
        }
        let generator_rx = if config.generator.enabled {
            Some(builder.register(address::GENERATOR)?)
        } else {
            None
        };
        let monitor_rx = if config.monitor.enabled {
            Some(builder.register(address::MONITOR)?)
        } else {
            None
        };
        let transport_rx = if config.transport.enabled {
            Some(builder.register(address::TRANSPORT)?)
        } else {
            None
        };
        let directory = builder.build();

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handles = Vec::new();
        let ctx = |name: &str, inbox| {
            AgentContext::new(name, directory.clone(), inbox, shutdown_tx.subscribe())
        };

        let supervisor = GlobalSupervisor::new(config.supervisor.clone());
        handles.push(spawn_agent(supervisor, ctx(address::SUPERVISOR, supervisor_rx)));

        for (site, inbox) in sites.iter().zip(site_rxs) {
            let coordinator = SiteCoordinator::new(site.clone(), config.site.clone());
            handles.push(spawn_agent(coordinator, ctx(&address::coordinator(site), inbox)));
        }

        for (spec, inbox) in units.into_iter().zip(unit_rxs) {
            let policy = policy_for(&spec);
            let name = spec.id.clone();
            let unit = UnitAgent::new(spec, config.unit.clone(), policy);
            handles.push(spawn_agent(unit, ctx(&name, inbox)));
        }

        if let Some(inbox) = transport_rx {
            let policy = ProbabilisticPolicy::new(
                config.transport.failure_probability,
                config.transport.recovery_probability,
                config.seed.map(|s| s.wrapping_add(1_000)),
            );
            let transport = TransportService::new(config.transport.clone(), Box::new(policy));
            handles.push(spawn_agent(transport, ctx(address::TRANSPORT, inbox)));
        }

        if let Some(inbox) = monitor_rx {
            let monitor = TelemetryMonitor::new(config.monitor.clone());
            handles.push(spawn_agent(monitor, ctx(address::MONITOR, inbox)));
        }

        if let Some(inbox) = generator_rx {
            let generator = TaskGenerator::new(
                config.generator.clone(),
                config.topology.unit_ids(),
                sites.clone(),
                config.seed,
            );
            handles.push(spawn_agent(generator, ctx(address::GENERATOR, inbox)));
        }

        info!(
            agents = handles.len(),
            sites = sites.len(),
            units = config.topology.units.len(),
            "all agents spawned"
        );

        Ok(Self {
            directory,
            shutdown_tx,
            handles,
        })
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Snapshot of one agent's state
    pub async fn report(&self, name: &str) -> Result<serde_json::Value> {
        self.directory.report(name).await
    }

    /// Signal every agent and wait for them to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        info!("waiting for agents to finish...");
        for jh in self.handles {
            let _ = tokio::time::timeout(JOIN_TIMEOUT, jh).await;
        }
        info!("plant shutdown complete");
    }
}

fn spawn_agent<A: Agent>(agent: A, ctx: AgentContext) -> JoinHandle<()> {
    let name = agent.name().to_string();
    let tier = agent.tier();
    tokio::spawn(async move {
        if let Err(e) = agent.run(ctx).await {
            error!(agent = %name, %tier, error = %e, "agent exited with error");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_rejects_invalid_topology() {
        let mut config = AppConfig::default();
        config.topology.units[0].site = "Z".to_string();
        match Plant::launch(&config) {
            Err(PlantError::InvalidConfig(errors)) => assert_eq!(errors.len(), 1),
            other => panic!("expected InvalidConfig, got {:?}", other.err()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_registers_every_agent() {
        let config = AppConfig {
            seed: Some(1),
            ..AppConfig::default()
        };
        let plant = Plant::launch(&config).unwrap();

        let names = plant.directory().names();
        for name in [
            address::SUPERVISOR,
            "SiteCoordinator_A",
            "SiteCoordinator_B",
            "M1",
            "M4",
            address::GENERATOR,
            address::MONITOR,
            address::TRANSPORT,
        ] {
            assert!(names.iter().any(|n| n == name), "{name} missing");
        }

        let unit = plant.report("M1").await.unwrap();
        assert_eq!(unit["site"], "A");
        plant.shutdown().await;
    }
}
