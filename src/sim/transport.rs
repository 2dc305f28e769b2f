//! TransportService - finite-capacity shipping of finished products
//!
//! Accepts a transport while it is in service and below capacity. One
//! in-flight transport completes per drain tick; the same tick draws for
//! breakdown and repair.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::{Agent, Tier};
use crate::bus::{ticker, AgentContext, ControlCommand, Inbound, Outbox};
use crate::error::Result;
use crate::protocol::{address, Content, Envelope};
use crate::unit::FailurePolicy;

use super::config::TransportConfig;

pub const CAPACITY_FULL: &str = "CAPACITY_FULL";
pub const OUT_OF_SERVICE: &str = "OUT_OF_SERVICE";

#[derive(Debug, Clone, Serialize)]
pub struct TransportSnapshot {
    pub operational: bool,
    pub in_flight: u32,
    pub capacity: u32,
    pub accepted: u64,
    pub refused: u64,
    pub delivered: u64,
}

pub struct TransportService {
    config: TransportConfig,
    policy: Box<dyn FailurePolicy>,
    operational: bool,
    in_flight: u32,
    accepted: u64,
    refused: u64,
    delivered: u64,
}

impl TransportService {
    pub fn new(config: TransportConfig, policy: Box<dyn FailurePolicy>) -> Self {
        Self {
            config,
            policy,
            operational: true,
            in_flight: 0,
            accepted: 0,
            refused: 0,
            delivered: 0,
        }
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            operational: self.operational,
            in_flight: self.in_flight,
            capacity: self.config.capacity,
            accepted: self.accepted,
            refused: self.refused,
            delivered: self.delivered,
        }
    }

    fn on_request(&mut self, out: &Outbox, requester: &str, product: String, to: &str) {
        let refusal = if !self.operational {
            Some(OUT_OF_SERVICE)
        } else if self.in_flight >= self.config.capacity {
            Some(CAPACITY_FULL)
        } else {
            None
        };

        match refusal {
            Some(reason) => {
                self.refused += 1;
                debug!(product, requester, reason, "transport refused");
                out.send(
                    requester,
                    Content::TransportRefused {
                        product,
                        reason: reason.to_string(),
                    },
                );
            }
            None => {
                self.in_flight += 1;
                self.accepted += 1;
                debug!(product, requester, to, in_flight = self.in_flight, "transport accepted");
                out.send(
                    requester,
                    Content::TransportAccepted {
                        product,
                        eta_secs: self.config.estimated_secs,
                    },
                );
            }
        }
    }

    fn drain(&mut self) {
        if self.operational {
            if self.in_flight > 0 {
                self.in_flight -= 1;
                self.delivered += 1;
            }
            if self.policy.should_fail() {
                self.operational = false;
                warn!(in_flight = self.in_flight, "transport out of service");
            }
        } else if self.policy.should_recover() {
            self.operational = true;
            info!("transport back in service");
        }
    }

    fn handle_message(&mut self, out: &Outbox, env: Envelope) {
        match env.content {
            Content::TransportRequest { product, to, .. } => {
                self.on_request(out, &env.sender, product, &to)
            }
            other => debug!(from = %env.sender, message = %other, "transport ignoring message"),
        }
    }

    fn handle_control(&self, cmd: ControlCommand) {
        match cmd {
            ControlCommand::Report(reply) => {
                let value = serde_json::to_value(self.snapshot()).unwrap_or_default();
                let _ = reply.send(value);
            }
        }
    }
}

#[async_trait]
impl Agent for TransportService {
    fn name(&self) -> &str {
        address::TRANSPORT
    }

    fn tier(&self) -> Tier {
        Tier::Collaborator
    }

    async fn run(mut self, ctx: AgentContext) -> Result<()> {
        let (out, mut inbox, mut shutdown_rx) = ctx.into_parts();
        let mut drain_tick = ticker(self.config.drain_period_ms);

        loop {
            tokio::select! {
                Some(inbound) = inbox.recv() => match inbound {
                    Inbound::Message(env) => self.handle_message(&out, env),
                    Inbound::Control(cmd) => self.handle_control(cmd),
                },

                _ = drain_tick.tick() => self.drain(),

                _ = shutdown_rx.recv() => {
                    info!(delivered = self.delivered, "transport: shutdown signal received");
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
    use crate::bus::DirectoryBuilder;
    use crate::protocol::Performative;
    use crate::unit::FixedPolicy;
    use tokio::sync::{broadcast, mpsc};

    fn request(product: &str) -> Envelope {
        Envelope::new(
            Performative::Request,
            "M1",
            Content::TransportRequest {
                from: "M1".into(),
                to: "WAREHOUSE".into(),
                product: product.into(),
                priority: 5,
            },
        )
    }

    fn harness(policy: FixedPolicy) -> (TransportService, Outbox, mpsc::Receiver<Inbound>) {
        let mut builder = DirectoryBuilder::new(16);
        let own = builder.register(address::TRANSPORT).unwrap();
        let unit = builder.register("M1").unwrap();
        let (_tx, shutdown) = broadcast::channel(1);
        let ctx = AgentContext::new(address::TRANSPORT, builder.build(), own, shutdown);
        let config = TransportConfig {
            capacity: 1,
            ..TransportConfig::default()
        };
        (
            TransportService::new(config, Box::new(policy)),
            ctx.outbox(),
            unit,
        )
    }

    fn next(rx: &mut mpsc::Receiver<Inbound>) -> Envelope {
        match rx.try_recv() {
            Ok(Inbound::Message(env)) => env,
            _ => panic!("expected a message"),
        }
    }

    #[test]
    fn test_capacity_bounds_in_flight() {
        let (mut transport, out, mut unit) = harness(FixedPolicy::reliable());

        transport.handle_message(&out, request("P1"));
        let reply = next(&mut unit);
        assert_eq!(reply.performative, Performative::Confirm);
        assert_eq!(
            reply.content,
            Content::TransportAccepted {
                product: "P1".into(),
                eta_secs: 5
            }
        );

        transport.handle_message(&out, request("P2"));
        assert_eq!(
            next(&mut unit).content,
            Content::TransportRefused {
                product: "P2".into(),
                reason: CAPACITY_FULL.into()
            }
        );

        transport.drain();
        transport.handle_message(&out, request("P3"));
        assert_eq!(next(&mut unit).performative, Performative::Confirm);
        assert_eq!(transport.snapshot().delivered, 1);
    }

    #[test]
    fn test_out_of_service_refuses() {
        let (mut transport, out, mut unit) = harness(FixedPolicy::always_fail());
        transport.drain();
        assert!(!transport.snapshot().operational);

        transport.handle_message(&out, request("P1"));
        assert_eq!(
            next(&mut unit).content,
            Content::TransportRefused {
                product: "P1".into(),
                reason: OUT_OF_SERVICE.into()
            }
        );
    }
}
