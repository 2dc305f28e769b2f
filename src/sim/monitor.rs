//! TelemetryMonitor - passive dashboard of unit telemetry
//!
//! Records the gossip pings units copy to it and logs a dashboard on a timer.
//! Sends nothing.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

use crate::agent::{Agent, Tier};
use crate::bus::{ticker, AgentContext, ControlCommand, Inbound};
use crate::error::Result;
use crate::protocol::{address, Content, Envelope};

use super::config::MonitorConfig;

#[derive(Debug, Clone, Serialize)]
pub struct Telemetry {
    pub site: String,
    pub load: f64,
    pub queue: Option<u32>,
    pub operational: Option<bool>,
    pub spare_capacity: Option<u32>,
    #[serde(skip)]
    last_seen: Instant,
}

pub struct TelemetryMonitor {
    config: MonitorConfig,
    units: BTreeMap<String, Telemetry>,
    samples: u64,
}

impl TelemetryMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            units: BTreeMap::new(),
            samples: 0,
        }
    }

    pub fn telemetry(&self, unit: &str) -> Option<&Telemetry> {
        self.units.get(unit)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn record(&mut self, env: Envelope) {
        let now = Instant::now();
        match env.content {
            Content::Ping {
                unit,
                load,
                queue,
                site,
            } => {
                let entry = self.units.entry(unit).or_insert_with(|| Telemetry {
                    site: site.clone(),
                    load,
                    queue: None,
                    operational: None,
                    spare_capacity: None,
                    last_seen: now,
                });
                entry.site = site;
                entry.load = load;
                entry.queue = Some(queue);
                entry.last_seen = now;
            }
            Content::Pong {
                unit,
                load,
                operational,
                spare_capacity,
                site,
            } => {
                let entry = self.units.entry(unit).or_insert_with(|| Telemetry {
                    site: site.clone(),
                    load,
                    queue: None,
                    operational: None,
                    spare_capacity: None,
                    last_seen: now,
                });
                entry.site = site;
                entry.load = load;
                entry.operational = Some(operational);
                entry.spare_capacity = Some(spare_capacity);
                entry.last_seen = now;
            }
            other => {
                debug!(from = %env.sender, message = %other, "monitor ignoring message");
                return;
            }
        }
        self.samples += 1;
    }

    /// Drop units not heard from within the stale window
    fn evict_stale(&mut self) -> usize {
        let stale_after = Duration::from_millis(self.config.stale_after_ms);
        let now = Instant::now();
        let before = self.units.len();
        self.units
            .retain(|_, t| now.duration_since(t.last_seen) <= stale_after);
        before - self.units.len()
    }

    fn dashboard(&mut self) {
        let evicted = self.evict_stale();
        if self.units.is_empty() {
            info!(evicted, "dashboard: no telemetry");
            return;
        }

        let mean = self.units.values().map(|t| t.load).sum::<f64>() / self.units.len() as f64;
        info!(
            units = self.units.len(),
            samples = self.samples,
            evicted,
            mean_load = mean,
            "dashboard"
        );
        for (unit, t) in &self.units {
            let queue = t.queue.map(|q| q.to_string()).unwrap_or_else(|| "-".into());
            info!("  {unit:<6} site={:<4} load={:>5.1}% queue={queue}", t.site, t.load);
        }
    }

    fn handle_control(&self, cmd: ControlCommand) {
        match cmd {
            ControlCommand::Report(reply) => {
                let value = serde_json::json!({
                    "samples": self.samples,
                    "units": self.units,
                });
                let _ = reply.send(value);
            }
        }
    }
}

#[async_trait]
impl Agent for TelemetryMonitor {
    fn name(&self) -> &str {
        address::MONITOR
    }

    fn tier(&self) -> Tier {
        Tier::Collaborator
    }

    async fn run(mut self, ctx: AgentContext) -> Result<()> {
        let (_out, mut inbox, mut shutdown_rx) = ctx.into_parts();
        let mut dashboard_tick = ticker(self.config.dashboard_period_ms);

        loop {
            tokio::select! {
                Some(inbound) = inbox.recv() => match inbound {
                    Inbound::Message(env) => self.record(env),
                    Inbound::Control(cmd) => self.handle_control(cmd),
                },

                _ = dashboard_tick.tick() => self.dashboard(),

                _ = shutdown_rx.recv() => {
                    info!("monitor: shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Performative;

    fn ping(unit: &str, load: f64) -> Envelope {
        Envelope::new(
            Performative::Inform,
            unit,
            Content::Ping {
                unit: unit.into(),
                load,
                queue: 2,
                site: "A".into(),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_then_pong_merges_entry() {
        let mut monitor = TelemetryMonitor::new(MonitorConfig::default());
        monitor.record(ping("M1", 40.0));
        monitor.record(Envelope::new(
            Performative::Inform,
            "M1",
            Content::Pong {
                unit: "M1".into(),
                load: 45.0,
                operational: true,
                spare_capacity: 5,
                site: "A".into(),
            },
        ));

        let t = monitor.telemetry("M1").unwrap();
        assert_eq!(t.load, 45.0);
        assert_eq!(t.queue, Some(2));
        assert_eq!(t.operational, Some(true));
        assert_eq!(monitor.samples, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_units_are_evicted() {
        let mut monitor = TelemetryMonitor::new(MonitorConfig::default());
        monitor.record(ping("M1", 40.0));
        tokio::time::advance(Duration::from_secs(10)).await;
        monitor.record(ping("M2", 10.0));
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(monitor.evict_stale(), 1);
        assert!(monitor.telemetry("M1").is_none());
        assert!(monitor.telemetry("M2").is_some());
    }
}
