//! UnitAgent - tier 1, one production unit
//!
//! Owns capacity, queue, load and operational state. Decides admission on its
//! own, processes accepted work on a per-task timer, gossips telemetry to its
//! peers and self-reports failures and repairs to its site coordinator.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::agent::{Agent, Tier};
use crate::bus::{ticker, AgentContext, ControlCommand, Inbound, Outbox};
use crate::domain::{Task, UnitSpec, UnitType};
use crate::error::Result;
use crate::protocol::{address, Content, Envelope, Performative};

use super::admission::{evaluate_admission, proposal_score, Admission, AdmissionInput};
use super::config::UnitConfig;
use super::policy::FailurePolicy;

/// Serializable view of a unit, answered to `Report` requests
#[derive(Debug, Clone, Serialize)]
pub struct UnitSnapshot {
    pub id: String,
    pub unit_type: UnitType,
    pub site: String,
    pub operational: bool,
    pub load: f64,
    pub capacity: u32,
    pub queue: Vec<String>,
    pub completed: u64,
    pub failed: u64,
    pub refused: u64,
}

pub struct UnitAgent {
    spec: UnitSpec,
    config: UnitConfig,
    coordinator: String,
    policy: Box<dyn FailurePolicy>,
    operational: bool,
    load: f64,
    queue: VecDeque<Task>,
    completed: u64,
    failed: u64,
    refused: u64,
}

impl UnitAgent {
    pub fn new(spec: UnitSpec, config: UnitConfig, policy: Box<dyn FailurePolicy>) -> Self {
        let coordinator = address::coordinator(&spec.site);
        Self {
            spec,
            config,
            coordinator,
            policy,
            operational: true,
            load: 0.0,
            queue: VecDeque::new(),
            completed: 0,
            failed: 0,
            refused: 0,
        }
    }

    pub fn snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            id: self.spec.id.clone(),
            unit_type: self.spec.unit_type.clone(),
            site: self.spec.site.clone(),
            operational: self.operational,
            load: self.load,
            capacity: self.spec.capacity,
            queue: self.queue.iter().map(|t| t.id.clone()).collect(),
            completed: self.completed,
            failed: self.failed,
            refused: self.refused,
        }
    }

    fn queue_len(&self) -> u32 {
        self.queue.len() as u32
    }

    fn spare_capacity(&self) -> u32 {
        self.spec.capacity.saturating_sub(self.queue_len())
    }

    fn register(&self, out: &Outbox) {
        out.send(
            &self.coordinator,
            Content::Register {
                unit: self.spec.id.clone(),
                unit_type: self.spec.unit_type.clone(),
                capacity: self.spec.capacity,
                operational: self.operational,
            },
        );
        info!(
            unit = %self.spec.id,
            unit_type = %self.spec.unit_type,
            site = %self.spec.site,
            capacity = self.spec.capacity,
            "unit registered with coordinator"
        );
    }

    fn handle_message(&mut self, out: &Outbox, done_tx: &mpsc::Sender<String>, env: Envelope) {
        let sender = env.sender;
        match env.content {
            Content::Task { task_id, priority } => {
                let task = Task::new(task_id, priority, sender.clone());
                self.on_task(out, done_tx, task);
            }
            Content::CallForProposal {
                task_id,
                requirements,
            } => self.on_call_for_proposal(out, &sender, task_id, &requirements),
            Content::Awarded { task_id } => {
                info!(unit = %self.spec.id, task_id, from = %sender, "proposal awarded");
            }
            Content::Declined { task_id } => {
                debug!(unit = %self.spec.id, task_id, "proposal declined");
            }
            Content::Ping { .. } => {
                out.send(
                    &sender,
                    Content::Pong {
                        unit: self.spec.id.clone(),
                        load: self.load,
                        operational: self.operational,
                        spare_capacity: self.spare_capacity(),
                        site: self.spec.site.clone(),
                    },
                );
            }
            Content::Pong {
                unit,
                load,
                operational,
                ..
            } => {
                debug!(unit = %self.spec.id, peer = %unit, load, operational, "peer telemetry");
            }
            Content::HelpOffer {
                unit,
                spare_capacity,
            } => {
                let needs_help = self.load > self.config.balance_request_load;
                debug!(unit = %self.spec.id, peer = %unit, spare_capacity, needs_help, "help offer");
                out.send(
                    &sender,
                    Content::HelpReply {
                        unit: self.spec.id.clone(),
                        needs_help,
                    },
                );
            }
            Content::HelpReply { unit, needs_help } => {
                if needs_help {
                    info!(unit = %self.spec.id, peer = %unit, "peer wants help");
                }
            }
            Content::UnitRegistered { site, .. } => {
                info!(unit = %self.spec.id, site, "registration confirmed");
            }
            Content::TransferTasks { to, count } => self.transfer_tasks(out, &to, count),
            Content::IncomingTasks { from, count } => {
                info!(unit = %self.spec.id, from, count, "expecting transferred tasks");
            }
            Content::Accepted { task_id, eta_secs } => {
                debug!(unit = %self.spec.id, task_id, peer = %sender, eta_secs, "transfer accepted");
            }
            Content::Refused {
                task_id, reason, ..
            } => {
                warn!(unit = %self.spec.id, task_id, peer = %sender, %reason, "transferred task refused, dropped");
            }
            Content::TransportAccepted { product, eta_secs } => {
                debug!(unit = %self.spec.id, product, eta_secs, "transport booked");
            }
            Content::TransportRefused { product, reason } => {
                warn!(unit = %self.spec.id, product, reason, "transport refused");
            }
            other => {
                debug!(unit = %self.spec.id, from = %sender, message = %other, "ignoring message");
            }
        }
    }

    fn on_task(&mut self, out: &Outbox, done_tx: &mpsc::Sender<String>, task: Task) {
        let input = AdmissionInput {
            operational: self.operational,
            load: self.load,
            queue_len: self.queue_len(),
            capacity: self.spec.capacity,
            priority: task.priority,
        };

        match evaluate_admission(
            &input,
            self.config.high_water_load,
            self.config.override_priority,
        ) {
            Admission::Accept => {
                let eta_secs = self.spec.cycle_time_secs() * (self.queue_len() + 1) as f64;
                let reply_to = task.origin.clone();
                let task_id = task.id.clone();
                self.enqueue_and_process(done_tx, task);
                out.send(&reply_to, Content::Accepted { task_id, eta_secs });
            }
            Admission::Refuse(reason) => {
                self.refused += 1;
                debug!(unit = %self.spec.id, task_id = %task.id, %reason, load = self.load, "task refused");
                out.send(
                    &task.origin,
                    Content::Refused {
                        task_id: task.id,
                        reason,
                        load: self.load,
                    },
                );
            }
        }
    }

    /// Queue the task and arm its completion timer
    fn enqueue_and_process(&mut self, done_tx: &mpsc::Sender<String>, task: Task) {
        self.load = (self.load + self.spec.load_increment()).min(100.0);
        info!(
            unit = %self.spec.id,
            task_id = %task.id,
            priority = task.priority,
            load = self.load,
            queue = self.queue.len() + 1,
            "task accepted"
        );

        let done_tx = done_tx.clone();
        let task_id = task.id.clone();
        let delay = Duration::from_millis(self.spec.cycle_time_ms);
        self.queue.push_back(task);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // unit loop gone means shutdown; nothing to report
            let _ = done_tx.send(task_id).await;
        });
    }

    fn complete_task(&mut self, out: &Outbox, task_id: &str) {
        let Some(position) = self.queue.iter().position(|t| t.id == task_id) else {
            debug!(unit = %self.spec.id, task_id, "completion for task no longer queued");
            return;
        };
        let task = self.queue.remove(position);
        self.load = (self.load - self.spec.load_increment()).max(0.0);

        if !self.operational {
            self.failed += 1;
            warn!(unit = %self.spec.id, task_id, "task lost while unit failed");
            return;
        }

        self.completed += 1;
        info!(unit = %self.spec.id, task_id, load = self.load, completed = self.completed, "task completed");
        out.send(
            &self.coordinator,
            Content::TaskCompleted {
                task_id: task_id.to_string(),
                unit: self.spec.id.clone(),
            },
        );

        if self.config.ship_completed && out.directory().contains(address::TRANSPORT) {
            if let Some(task) = task {
                out.send(
                    address::TRANSPORT,
                    Content::TransportRequest {
                        from: self.spec.id.clone(),
                        to: self.config.ship_destination.clone(),
                        product: task.id,
                        priority: task.priority,
                    },
                );
            }
        }
    }

    fn on_call_for_proposal(&self, out: &Outbox, from: &str, task_id: String, requirements: &str) {
        if !self.operational {
            debug!(unit = %self.spec.id, task_id, "not operational, skipping call for proposals");
            return;
        }

        let score = proposal_score(
            self.load,
            self.queue_len(),
            self.spec.capacity,
            self.spec.energy,
        );
        if score <= self.config.proposal_threshold {
            debug!(unit = %self.spec.id, task_id, score, "score too low to propose");
            return;
        }

        debug!(unit = %self.spec.id, task_id, requirements, score, "proposing");
        out.send(
            from,
            Content::Proposal {
                task_id,
                score,
                eta_secs: self.spec.cycle_time_secs() * (self.queue_len() + 1) as f64,
                energy: self.spec.energy,
            },
        );
    }

    /// Hand tasks from the back of the queue to another unit
    fn transfer_tasks(&mut self, out: &Outbox, to: &str, count: u32) {
        if to == self.spec.id {
            return;
        }

        let mut moved = 0u32;
        while moved < count {
            let Some(task) = self.queue.pop_back() else {
                break;
            };
            self.load = (self.load - self.spec.load_increment()).max(0.0);
            out.send_as(
                to,
                Performative::Request,
                Content::Task {
                    task_id: task.id,
                    priority: task.priority,
                },
            );
            moved += 1;
        }

        info!(unit = %self.spec.id, to, requested = count, moved, load = self.load, "tasks transferred");
    }

    fn self_monitor(&mut self, out: &Outbox) {
        if self.operational {
            if self.policy.should_fail() {
                self.operational = false;
                warn!(unit = %self.spec.id, load = self.load, "self-detected failure");
                out.send(
                    &self.coordinator,
                    Content::Failure {
                        unit: self.spec.id.clone(),
                        error_code: "SELF_DETECTED".to_string(),
                    },
                );
            } else if self.load > self.config.overload_load {
                warn!(unit = %self.spec.id, load = self.load, "overloaded");
                out.send(
                    &self.coordinator,
                    Content::Overload {
                        unit: self.spec.id.clone(),
                        load: self.load,
                    },
                );
            }
        } else if self.policy.should_recover() {
            self.operational = true;
            info!(unit = %self.spec.id, "self-repaired");
            out.send(
                &self.coordinator,
                Content::Recovery {
                    unit: self.spec.id.clone(),
                    detail: "SELF_REPAIRED".to_string(),
                },
            );
        }

        out.send(
            &self.coordinator,
            Content::StatusUpdate {
                unit: self.spec.id.clone(),
                load: self.load,
                queue: self.queue_len(),
                operational: self.operational,
            },
        );
    }

    fn decision_cycle(&self, out: &Outbox) {
        if !self.operational {
            return;
        }

        if self.load > self.config.balance_request_load {
            info!(unit = %self.spec.id, load = self.load, queue = self.queue.len(), "requesting load balancing");
            out.send(
                &self.coordinator,
                Content::LoadBalancing {
                    unit: self.spec.id.clone(),
                    load: self.load,
                    queue: self.queue_len(),
                },
            );
        } else if self.load < self.config.help_offer_load {
            let offer = Content::HelpOffer {
                unit: self.spec.id.clone(),
                spare_capacity: self.spare_capacity(),
            };
            out.send_all(&self.spec.neighbors, &offer);
        }
    }

    fn gossip(&self, out: &Outbox) {
        let ping = Content::Ping {
            unit: self.spec.id.clone(),
            load: self.load,
            queue: self.queue_len(),
            site: self.spec.site.clone(),
        };
        out.send_all(&self.spec.neighbors, &ping);
        if out.directory().contains(address::MONITOR) {
            out.send(address::MONITOR, ping);
        }
    }

    fn local_optimization(&self) {
        let efficiency =
            self.completed as f64 / (self.completed + self.failed + 1) as f64 * 100.0;
        if self.load > 70.0 {
            debug!(unit = %self.spec.id, load = self.load, efficiency, "high load, holding parameters");
        } else if self.load < 30.0 {
            debug!(unit = %self.spec.id, load = self.load, efficiency, "economy mode");
        } else {
            debug!(unit = %self.spec.id, load = self.load, efficiency, "optimal zone");
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
impl Agent for UnitAgent {
    fn name(&self) -> &str {
        &self.spec.id
    }

    fn tier(&self) -> Tier {
        Tier::Unit
    }

    async fn run(mut self, ctx: AgentContext) -> Result<()> {
        let (out, mut inbox, mut shutdown_rx) = ctx.into_parts();
        let (done_tx, mut done_rx) = mpsc::channel::<String>(self.spec.capacity.max(1) as usize * 4);

        self.register(&out);

        let mut monitor_tick = ticker(self.config.monitor_period_ms);
        let mut decision_tick = ticker(self.config.decision_period_ms);
        let mut gossip_tick = ticker(self.config.gossip_period_ms);
        let mut optimize_tick = ticker(self.config.optimize_period_ms);

        loop {
            tokio::select! {
                Some(inbound) = inbox.recv() => match inbound {
                    Inbound::Message(env) => self.handle_message(&out, &done_tx, env),
                    Inbound::Control(cmd) => self.handle_control(cmd),
                },

                Some(task_id) = done_rx.recv() => {
                    self.complete_task(&out, &task_id);
                }

                _ = monitor_tick.tick() => self.self_monitor(&out),
                _ = decision_tick.tick() => self.decision_cycle(&out),
                _ = gossip_tick.tick() => self.gossip(&out),
                _ = optimize_tick.tick() => self.local_optimization(),

                _ = shutdown_rx.recv() => {
                    info!(unit = %self.spec.id, "shutdown signal received");
                    break;
                }
            }
        }

        info!(
            unit = %self.spec.id,
            completed = self.completed,
            failed = self.failed,
            "unit loop exited"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DirectoryBuilder;
    use crate::domain::RefusalReason;
    use crate::unit::FixedPolicy;

    fn spec() -> UnitSpec {
        UnitSpec {
            id: "M1".into(),
            unit_type: UnitType::Distribution,
            site: "A".into(),
            capacity: 2,
            cycle_time_ms: 2_000,
            energy: 50.0,
            neighbors: vec![],
        }
    }

    fn harness() -> (UnitAgent, Outbox, mpsc::Receiver<Inbound>) {
        let mut builder = DirectoryBuilder::new(32);
        let unit_rx = builder.register("M1").unwrap();
        let requester_rx = builder.register("TaskGenerator").unwrap();
        let _coordinator_rx = builder.register("SiteCoordinator_A").unwrap();
        let directory = builder.build();
        let (_tx, shutdown) = tokio::sync::broadcast::channel(1);
        let ctx = AgentContext::new("M1", directory, unit_rx, shutdown);
        let agent = UnitAgent::new(spec(), UnitConfig::default(), Box::new(FixedPolicy::reliable()));
        (agent, ctx.outbox(), requester_rx)
    }

    fn next_content(rx: &mut mpsc::Receiver<Inbound>) -> Content {
        match rx.try_recv() {
            Ok(Inbound::Message(env)) => env.content,
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_load_tracks_queue() {
        let (mut agent, out, mut requester) = harness();
        let (done_tx, _done_rx) = mpsc::channel(8);

        agent.on_task(&out, &done_tx, Task::new("T1", 5, "TaskGenerator"));
        assert_eq!(agent.load, 50.0);
        assert!(matches!(
            next_content(&mut requester),
            Content::Accepted { eta_secs, .. } if eta_secs == 2.0
        ));

        agent.on_task(&out, &done_tx, Task::new("T2", 5, "TaskGenerator"));
        assert_eq!(agent.load, 100.0);

        // full queue, low priority
        agent.on_task(&out, &done_tx, Task::new("T3", 3, "TaskGenerator"));
        let _ = next_content(&mut requester);
        assert!(matches!(
            next_content(&mut requester),
            Content::Refused { reason: RefusalReason::LoadHigh, .. }
        ));
        assert_eq!(agent.queue.len(), 2);

        agent.complete_task(&out, "T1");
        agent.complete_task(&out, "T1");
        assert_eq!(agent.load, 50.0);
        assert_eq!(agent.completed, 1);
    }

    #[tokio::test]
    async fn test_failed_unit_refuses_and_loses_work() {
        let (mut agent, out, mut requester) = harness();
        let (done_tx, _done_rx) = mpsc::channel(8);

        agent.on_task(&out, &done_tx, Task::new("T1", 5, "TaskGenerator"));
        let _ = next_content(&mut requester);

        agent.policy = Box::new(FixedPolicy::always_fail());
        agent.self_monitor(&out);
        assert!(!agent.operational);

        agent.on_task(&out, &done_tx, Task::new("T2", 10, "TaskGenerator"));
        assert!(matches!(
            next_content(&mut requester),
            Content::Refused { reason: RefusalReason::NotOperational, .. }
        ));

        agent.complete_task(&out, "T1");
        assert_eq!(agent.failed, 1);
        assert_eq!(agent.completed, 0);
        assert_eq!(agent.load, 0.0);
    }

    #[tokio::test]
    async fn test_transfer_moves_tasks_from_back() {
        let (mut agent, out, _requester) = harness();
        let (done_tx, _done_rx) = mpsc::channel(8);
        agent.on_task(&out, &done_tx, Task::new("T1", 5, "TaskGenerator"));
        agent.on_task(&out, &done_tx, Task::new("T2", 5, "TaskGenerator"));

        // unknown target: sends are dropped but the queue still shrinks
        agent.transfer_tasks(&out, "M9", 1);
        assert_eq!(agent.snapshot().queue, vec!["T1".to_string()]);
        assert_eq!(agent.load, 50.0);

        agent.transfer_tasks(&out, "M1", 5);
        assert_eq!(agent.queue.len(), 1);
    }

    /// A unit with live mailboxes for its coordinator, two neighbors and the monitor
    struct Wired {
        agent: UnitAgent,
        out: Outbox,
        requester: mpsc::Receiver<Inbound>,
        coordinator: mpsc::Receiver<Inbound>,
        neighbors: Vec<mpsc::Receiver<Inbound>>,
        monitor: mpsc::Receiver<Inbound>,
    }

    fn wired(policy: FixedPolicy) -> Wired {
        let mut builder = DirectoryBuilder::new(32);
        let unit_rx = builder.register("M1").unwrap();
        let requester = builder.register("TaskGenerator").unwrap();
        let coordinator = builder.register("SiteCoordinator_A").unwrap();
        let neighbors = vec![builder.register("M2").unwrap(), builder.register("M3").unwrap()];
        let monitor = builder.register(address::MONITOR).unwrap();
        let (_tx, shutdown) = tokio::sync::broadcast::channel(1);
        let ctx = AgentContext::new("M1", builder.build(), unit_rx, shutdown);

        let spec = UnitSpec {
            neighbors: vec!["M2".into(), "M3".into()],
            ..spec()
        };
        Wired {
            agent: UnitAgent::new(spec, UnitConfig::default(), Box::new(policy)),
            out: ctx.outbox(),
            requester,
            coordinator,
            neighbors,
            monitor,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Inbound>) -> Vec<Content> {
        let mut out = Vec::new();
        while let Ok(Inbound::Message(env)) = rx.try_recv() {
            out.push(env.content);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_unit_repairs_and_admits_again() {
        let mut w = wired(FixedPolicy {
            fail: false,
            recover: true,
        });
        w.agent.operational = false;
        let (done_tx, _done_rx) = mpsc::channel(8);

        w.agent.self_monitor(&w.out);
        assert_eq!(
            drain(&mut w.coordinator),
            vec![
                Content::Recovery {
                    unit: "M1".into(),
                    detail: "SELF_REPAIRED".into(),
                },
                Content::StatusUpdate {
                    unit: "M1".into(),
                    load: 0.0,
                    queue: 0,
                    operational: true,
                },
            ]
        );
        assert!(w.agent.operational);

        let input = AdmissionInput {
            operational: w.agent.operational,
            load: w.agent.load,
            queue_len: w.agent.queue_len(),
            capacity: w.agent.spec.capacity,
            priority: 5,
        };
        let config = UnitConfig::default();
        assert_eq!(
            evaluate_admission(&input, config.high_water_load, config.override_priority),
            Admission::Accept
        );

        w.agent.on_task(&w.out, &done_tx, Task::new("T1", 5, "TaskGenerator"));
        assert!(matches!(
            drain(&mut w.requester).as_slice(),
            [Content::Accepted { task_id, .. }] if task_id == "T1"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overload_is_reported_above_95() {
        let mut w = wired(FixedPolicy::reliable());

        w.agent.load = 95.0;
        w.agent.self_monitor(&w.out);
        assert!(matches!(
            drain(&mut w.coordinator).as_slice(),
            [Content::StatusUpdate { .. }]
        ));

        w.agent.load = 96.0;
        w.agent.self_monitor(&w.out);
        assert_eq!(
            drain(&mut w.coordinator),
            vec![
                Content::Overload {
                    unit: "M1".into(),
                    load: 96.0,
                },
                Content::StatusUpdate {
                    unit: "M1".into(),
                    load: 96.0,
                    queue: 0,
                    operational: true,
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_cycle_thresholds() {
        let mut w = wired(FixedPolicy::reliable());

        // 85% is not above the balance threshold, 30% is not below the offer threshold
        for load in [85.0, 30.0] {
            w.agent.load = load;
            w.agent.decision_cycle(&w.out);
            assert!(drain(&mut w.coordinator).is_empty(), "load {load}");
            assert!(w.neighbors.iter_mut().all(|rx| drain(rx).is_empty()), "load {load}");
        }

        w.agent.load = 85.5;
        w.agent.decision_cycle(&w.out);
        assert_eq!(
            drain(&mut w.coordinator),
            vec![Content::LoadBalancing {
                unit: "M1".into(),
                load: 85.5,
                queue: 0,
            }]
        );
        assert!(w.neighbors.iter_mut().all(|rx| drain(rx).is_empty()));

        w.agent.load = 29.5;
        w.agent.decision_cycle(&w.out);
        assert!(drain(&mut w.coordinator).is_empty());
        for rx in w.neighbors.iter_mut() {
            assert_eq!(
                drain(rx),
                vec![Content::HelpOffer {
                    unit: "M1".into(),
                    spare_capacity: 2,
                }]
            );
        }
        assert!(drain(&mut w.monitor).is_empty());

        // a failed unit stays silent
        w.agent.operational = false;
        w.agent.load = 90.0;
        w.agent.decision_cycle(&w.out);
        assert!(drain(&mut w.coordinator).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gossip_pings_neighbors_and_monitor() {
        let mut w = wired(FixedPolicy::reliable());
        w.agent.load = 50.0;
        w.agent.gossip(&w.out);

        let ping = Content::Ping {
            unit: "M1".into(),
            load: 50.0,
            queue: 0,
            site: "A".into(),
        };
        for rx in w.neighbors.iter_mut() {
            assert_eq!(drain(rx), vec![ping.clone()]);
        }
        assert_eq!(drain(&mut w.monitor), vec![ping]);
        assert!(drain(&mut w.coordinator).is_empty());
    }
}
