//! SiteCoordinator - tier 2, one per site
//!
//! Keeps the unit directory current from unit push events, tries local
//! remediation first (replacement unit, redistribution) and escalates to the
//! global supervisor exactly once per event it cannot resolve. Supervisor
//! directives are applied (throttling) or recorded as advisories.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::agent::{Agent, Tier};
use crate::bus::{ticker, AgentContext, ControlCommand, Inbound, Outbox};
use crate::domain::{DirectiveAction, IssueKind, Severity, SiteStatus};
use crate::error::Result;
use crate::protocol::{address, Content, Envelope, Performative, PriorityLevel};

use super::config::SiteConfig;
use super::directory::UnitDirectory;

/// A supervisor instruction the coordinator logged but did not act on
#[derive(Debug, Clone, Serialize)]
pub struct Advisory {
    pub received_at: DateTime<Utc>,
    pub from: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteSnapshot {
    pub site_id: String,
    pub status: SiteStatus,
    pub units: UnitDirectory,
    pub throttled: bool,
    pub deferred_resources: Vec<String>,
    pub advisories: Vec<Advisory>,
    pub escalations: u64,
    pub resolved_locally: u64,
    pub forwarded_assigned: u64,
    pub forwarded_refused: u64,
}

pub struct SiteCoordinator {
    site_id: String,
    name: String,
    config: SiteConfig,
    directory: UnitDirectory,
    failures: u32,
    completed: u64,
    escalations: u64,
    resolved_locally: u64,
    forwarded_assigned: u64,
    forwarded_refused: u64,
    throttled_until: Option<Instant>,
    deferred: BTreeSet<String>,
    advisories: VecDeque<Advisory>,
}

impl SiteCoordinator {
    pub fn new(site_id: impl Into<String>, config: SiteConfig) -> Self {
        let site_id = site_id.into();
        let name = address::coordinator(&site_id);
        Self {
            site_id,
            name,
            config,
            directory: UnitDirectory::new(),
            failures: 0,
            completed: 0,
            escalations: 0,
            resolved_locally: 0,
            forwarded_assigned: 0,
            forwarded_refused: 0,
            throttled_until: None,
            deferred: BTreeSet::new(),
            advisories: VecDeque::new(),
        }
    }

    pub fn site_status(&self) -> SiteStatus {
        self.directory
            .status(&self.site_id, self.failures, self.completed)
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled_until
            .map_or(false, |until| Instant::now() < until)
    }

    pub fn snapshot(&self) -> SiteSnapshot {
        SiteSnapshot {
            site_id: self.site_id.clone(),
            status: self.site_status(),
            units: self.directory.clone(),
            throttled: self.is_throttled(),
            deferred_resources: self.deferred.iter().cloned().collect(),
            advisories: self.advisories.iter().cloned().collect(),
            escalations: self.escalations,
            resolved_locally: self.resolved_locally,
            forwarded_assigned: self.forwarded_assigned,
            forwarded_refused: self.forwarded_refused,
        }
    }

    fn handle_message(&mut self, out: &Outbox, env: Envelope) {
        let sender = env.sender;
        match env.content {
            Content::Register {
                unit,
                unit_type,
                capacity,
                operational,
            } => {
                let new = self
                    .directory
                    .upsert(&unit, unit_type.clone(), capacity, operational);
                info!(site = %self.site_id, unit, %unit_type, capacity, new, "unit registered");
                out.send(
                    &sender,
                    Content::UnitRegistered {
                        unit,
                        site: self.site_id.clone(),
                    },
                );
            }
            Content::StatusUpdate {
                unit,
                load,
                queue,
                operational,
            } => {
                if !self.directory.update_status(&unit, load, queue, operational) {
                    warn!(site = %self.site_id, unit, "status from unregistered unit dropped");
                }
            }
            Content::TaskCompleted { task_id, unit } => {
                if self.directory.record_completion(&unit) {
                    self.completed += 1;
                    debug!(site = %self.site_id, unit, task_id, "task completed");
                } else {
                    warn!(site = %self.site_id, unit, task_id, "completion from unregistered unit dropped");
                }
            }
            Content::Failure { unit, error_code } => self.on_failure_event(out, &unit, &error_code),
            Content::Recovery { unit, detail } => {
                if self.directory.set_operational(&unit, true) {
                    info!(site = %self.site_id, unit, detail, "unit recovered");
                } else {
                    warn!(site = %self.site_id, unit, "recovery from unregistered unit dropped");
                }
            }
            Content::Overload { unit, load } => self.on_overload_event(out, &unit, load),
            Content::LoadBalancing { unit, load, queue } => {
                self.on_load_balance_request(out, &unit, load, queue)
            }
            Content::SiteRegistered { .. } => {
                info!(site = %self.site_id, "registered with supervisor");
            }
            Content::Directive {
                action,
                unit,
                description,
            } => self.on_directive(&sender, action, &unit, &description),
            Content::InterSiteTask { task_id, priority } => {
                self.on_forwarded_task(out, task_id, priority)
            }
            Content::ResourcePriority {
                level,
                resource,
                defer,
            } => {
                match level {
                    PriorityLevel::Low if defer => {
                        self.deferred.insert(resource.clone());
                    }
                    PriorityLevel::High => {
                        self.deferred.remove(&resource);
                    }
                    PriorityLevel::Low => {}
                }
                let message = Content::ResourcePriority {
                    level,
                    resource,
                    defer,
                };
                self.record_advisory(&sender, &message);
            }
            content @ (Content::AcceptLoad { .. }
            | Content::TransferResource { .. }
            | Content::IncomingResource { .. }
            | Content::ResourceGranted { .. }
            | Content::ResourceUnavailable { .. }) => self.record_advisory(&sender, &content),
            Content::Accepted { task_id, eta_secs } => {
                debug!(site = %self.site_id, unit = %sender, task_id, eta_secs, "forwarded task accepted");
            }
            Content::Refused {
                task_id, reason, ..
            } => {
                warn!(site = %self.site_id, unit = %sender, task_id, %reason, "forwarded task refused");
            }
            other => {
                debug!(site = %self.site_id, from = %sender, message = %other, "ignoring message");
            }
        }
    }

    fn escalate(&mut self, out: &Outbox, issue: IssueKind, unit: &str, severity: Severity) {
        self.escalations += 1;
        warn!(site = %self.site_id, %issue, unit, %severity, "escalating to supervisor");
        out.send(
            address::SUPERVISOR,
            Content::Escalation {
                site: self.site_id.clone(),
                issue,
                unit: unit.to_string(),
                severity,
            },
        );
    }

    fn on_failure_event(&mut self, out: &Outbox, unit: &str, error_code: &str) {
        if !self.directory.set_operational(unit, false) {
            warn!(site = %self.site_id, unit, error_code, "failure from unregistered unit dropped");
            return;
        }
        self.failures += 1;

        match self
            .directory
            .replacement_for(unit, self.config.replacement_load)
        {
            Some(replacement) => {
                info!(site = %self.site_id, unit, replacement, error_code, "failure resolved locally");
                self.resolved_locally += 1;
            }
            None => self.escalate(out, IssueKind::Failure, unit, Severity::Critical),
        }
    }

    fn on_overload_event(&mut self, out: &Outbox, unit: &str, load: f64) {
        if !self.directory.update_load(unit, load, None) {
            warn!(site = %self.site_id, unit, "overload from unregistered unit dropped");
            return;
        }
        let queue = self.directory.get(unit).map_or(0, |e| e.queue_len);
        if !self.redistribute(out, unit, queue) {
            self.escalate(out, IssueKind::SiteOverload, unit, Severity::High);
        }
    }

    fn on_load_balance_request(&mut self, out: &Outbox, unit: &str, load: f64, queue: u32) {
        if !self.directory.update_load(unit, load, Some(queue)) {
            warn!(site = %self.site_id, unit, "balance request from unregistered unit dropped");
            return;
        }
        if !self.redistribute(out, unit, queue) {
            self.escalate(out, IssueKind::NoResources, unit, Severity::Medium);
        }
    }

    /// Move half of `from`'s queue to the least-loaded other unit, if one is
    /// below the balance target
    fn redistribute(&mut self, out: &Outbox, from: &str, queue: u32) -> bool {
        let Some((target, target_load)) = self
            .directory
            .least_loaded(Some(from))
            .filter(|(_, e)| e.load < self.config.balance_target_load)
            .map(|(id, e)| (id.to_string(), e.load))
        else {
            return false;
        };

        let count = queue / 2;
        info!(site = %self.site_id, from, to = %target, target_load, count, "redistributing load");
        out.send(
            from,
            Content::TransferTasks {
                to: target.clone(),
                count,
            },
        );
        out.send(
            &target,
            Content::IncomingTasks {
                from: from.to_string(),
                count,
            },
        );
        self.resolved_locally += 1;
        true
    }

    fn on_directive(&mut self, from: &str, action: DirectiveAction, unit: &str, description: &str) {
        if action.is_throttling() {
            let window = Duration::from_millis(self.config.throttle_window_ms);
            self.throttled_until = Some(Instant::now() + window);
            warn!(site = %self.site_id, %action, unit, description, "throttling forwarded work");
        } else {
            info!(site = %self.site_id, %action, unit, description, "advisory directive");
        }
        let message = Content::Directive {
            action,
            unit: unit.to_string(),
            description: description.to_string(),
        };
        self.record_advisory(from, &message);
    }

    fn record_advisory(&mut self, from: &str, message: &Content) {
        debug!(site = %self.site_id, from, message = %message, "advisory recorded");
        if self.advisories.len() >= self.config.advisory_history.max(1) {
            self.advisories.pop_front();
        }
        self.advisories.push_back(Advisory {
            received_at: Utc::now(),
            from: from.to_string(),
            message: message.encode(),
        });
    }

    fn on_forwarded_task(&mut self, out: &Outbox, task_id: String, priority: u8) {
        if self.is_throttled() {
            self.forwarded_refused += 1;
            warn!(site = %self.site_id, task_id, "throttled, forwarded task refused");
            return;
        }

        let Some(unit) = self.directory.least_loaded(None).map(|(id, _)| id.to_string()) else {
            self.forwarded_refused += 1;
            warn!(site = %self.site_id, task_id, "no operational unit for forwarded task");
            return;
        };

        self.forwarded_assigned += 1;
        info!(site = %self.site_id, task_id, unit, priority, "forwarded task assigned");
        out.send_as(
            &unit,
            Performative::Request,
            Content::Task { task_id, priority },
        );
    }

    fn monitor(&self) {
        let load_average = self.directory.load_average();
        if load_average > self.config.alert_load {
            warn!(site = %self.site_id, load_average, "site load above alert level");
        } else {
            debug!(site = %self.site_id, load_average, units = self.directory.len(), "site load");
        }
    }

    fn report(&self, out: &Outbox) {
        let status = self.site_status();
        debug!(
            site = %self.site_id,
            load = status.load_average,
            operational = status.operational_units,
            total = status.total_units,
            "reporting site status"
        );
        out.send(address::SUPERVISOR, Content::SiteStatus(status));
    }

    fn resolve_local_conflicts(&mut self) {
        let (overloaded, underloaded) = self
            .directory
            .load_extremes(self.config.overloaded_load, self.config.underloaded_load);
        if overloaded.is_empty() || underloaded.is_empty() {
            return;
        }
        info!(
            site = %self.site_id,
            overloaded = ?overloaded,
            underloaded = ?underloaded,
            "local load conflict noted"
        );
        self.resolved_locally += 1;
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
impl Agent for SiteCoordinator {
    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> Tier {
        Tier::Site
    }

    async fn run(mut self, ctx: AgentContext) -> Result<()> {
        let (out, mut inbox, mut shutdown_rx) = ctx.into_parts();

        out.send(
            address::SUPERVISOR,
            Content::RegisterSite {
                site: self.site_id.clone(),
            },
        );
        info!(site = %self.site_id, "coordinator starting main loop");

        let mut monitor_tick = ticker(self.config.monitor_period_ms);
        let mut report_tick = ticker(self.config.report_period_ms);
        let mut conflict_tick = ticker(self.config.conflict_period_ms);

        loop {
            tokio::select! {
                Some(inbound) = inbox.recv() => match inbound {
                    Inbound::Message(env) => self.handle_message(&out, env),
                    Inbound::Control(cmd) => self.handle_control(cmd),
                },

                _ = monitor_tick.tick() => self.monitor(),
                _ = report_tick.tick() => self.report(&out),
                _ = conflict_tick.tick() => self.resolve_local_conflicts(),

                _ = shutdown_rx.recv() => {
                    info!(site = %self.site_id, "shutdown signal received");
                    break;
                }
            }
        }

        info!(site = %self.site_id, escalations = self.escalations, "coordinator loop exited");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DirectoryBuilder;
    use crate::domain::UnitType;
    use tokio::sync::mpsc;

    struct Harness {
        coordinator: SiteCoordinator,
        out: Outbox,
        supervisor: mpsc::Receiver<Inbound>,
        m1: mpsc::Receiver<Inbound>,
        m2: mpsc::Receiver<Inbound>,
    }

    fn harness() -> Harness {
        let mut builder = DirectoryBuilder::new(32);
        let own = builder.register("SiteCoordinator_A").unwrap();
        let supervisor = builder.register(address::SUPERVISOR).unwrap();
        let m1 = builder.register("M1").unwrap();
        let m2 = builder.register("M2").unwrap();
        let directory = builder.build();
        let (_tx, shutdown) = tokio::sync::broadcast::channel(1);
        let ctx = AgentContext::new("SiteCoordinator_A", directory, own, shutdown);

        let mut coordinator = SiteCoordinator::new("A", SiteConfig::default());
        coordinator.directory.upsert("M1", UnitType::Machining, 10, true);
        coordinator.directory.upsert("M2", UnitType::Machining, 8, true);

        Harness {
            coordinator,
            out: ctx.outbox(),
            supervisor,
            m1,
            m2,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Inbound>) -> Vec<Content> {
        let mut out = Vec::new();
        while let Ok(Inbound::Message(env)) = rx.try_recv() {
            out.push(env.content);
        }
        out
    }

    #[test]
    fn test_failure_with_replacement_stays_local() {
        let mut h = harness();
        h.coordinator.on_failure_event(&h.out, "M1", "SELF_DETECTED");
        assert!(drain(&mut h.supervisor).is_empty());
        assert_eq!(h.coordinator.failures, 1);
        assert_eq!(h.coordinator.resolved_locally, 1);
    }

    #[test]
    fn test_failure_without_replacement_escalates_once() {
        let mut h = harness();
        h.coordinator.directory.update_load("M2", 75.0, Some(6));
        h.coordinator.on_failure_event(&h.out, "M1", "SELF_DETECTED");

        let sent = drain(&mut h.supervisor);
        assert_eq!(
            sent,
            vec![Content::Escalation {
                site: "A".into(),
                issue: IssueKind::Failure,
                unit: "M1".into(),
                severity: Severity::Critical,
            }]
        );

        // unknown unit: dropped, no escalation
        h.coordinator.on_failure_event(&h.out, "M9", "SELF_DETECTED");
        assert!(drain(&mut h.supervisor).is_empty());
    }

    #[test]
    fn test_load_balance_request_redistributes_half_the_queue() {
        let mut h = harness();
        h.coordinator.on_load_balance_request(&h.out, "M1", 88.0, 9);

        assert_eq!(
            drain(&mut h.m1),
            vec![Content::TransferTasks {
                to: "M2".into(),
                count: 4
            }]
        );
        assert_eq!(
            drain(&mut h.m2),
            vec![Content::IncomingTasks {
                from: "M1".into(),
                count: 4
            }]
        );
        assert!(drain(&mut h.supervisor).is_empty());
    }

    #[test]
    fn test_load_balance_request_escalates_without_target() {
        let mut h = harness();
        h.coordinator.directory.update_load("M2", 72.0, Some(5));
        h.coordinator.on_load_balance_request(&h.out, "M1", 88.0, 9);
        assert!(matches!(
            drain(&mut h.supervisor).as_slice(),
            [Content::Escalation {
                issue: IssueKind::NoResources,
                severity: Severity::Medium,
                ..
            }]
        ));
    }

    #[test]
    fn test_overload_without_target_escalates_high() {
        let mut h = harness();
        h.coordinator.directory.update_load("M1", 40.0, Some(7));
        h.coordinator.directory.update_load("M2", 72.0, Some(5));
        h.coordinator.on_overload_event(&h.out, "M1", 97.0);

        assert_eq!(h.coordinator.directory.get("M1").map(|e| e.load), Some(97.0));
        assert_eq!(
            drain(&mut h.supervisor),
            vec![Content::Escalation {
                site: "A".into(),
                issue: IssueKind::SiteOverload,
                unit: "M1".into(),
                severity: Severity::High,
            }]
        );
        assert!(drain(&mut h.m1).is_empty());
        assert_eq!(h.coordinator.escalations, 1);

        // unknown unit: dropped, no escalation
        h.coordinator.on_overload_event(&h.out, "M9", 99.0);
        assert!(drain(&mut h.supervisor).is_empty());
    }

    #[test]
    fn test_overload_with_idle_peer_redistributes() {
        let mut h = harness();
        h.coordinator.directory.update_load("M1", 90.0, Some(6));
        h.coordinator.on_overload_event(&h.out, "M1", 97.0);

        assert_eq!(
            drain(&mut h.m1),
            vec![Content::TransferTasks {
                to: "M2".into(),
                count: 3
            }]
        );
        assert!(drain(&mut h.supervisor).is_empty());
        assert_eq!(h.coordinator.resolved_locally, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_directive_refuses_forwarded_work_for_window() {
        let mut h = harness();
        h.coordinator.on_forwarded_task(&h.out, "IS1".into(), 8);
        assert_eq!(h.coordinator.forwarded_assigned, 1);
        assert!(matches!(drain(&mut h.m1).as_slice(), [Content::Task { .. }]));

        h.coordinator
            .on_directive(address::SUPERVISOR, DirectiveAction::Throttle, "M1", "too hot");
        h.coordinator.on_forwarded_task(&h.out, "IS2".into(), 8);
        assert_eq!(h.coordinator.forwarded_refused, 1);
        assert_eq!(h.coordinator.advisories.len(), 1);

        tokio::time::advance(Duration::from_millis(30_001)).await;
        assert!(!h.coordinator.is_throttled());
    }

    #[test]
    fn test_contention_notices_track_deferred_resources() {
        let mut h = harness();
        let low = Envelope::new(
            Performative::Inform,
            address::SUPERVISOR,
            Content::ResourcePriority {
                level: PriorityLevel::Low,
                resource: "ENERGY".into(),
                defer: true,
            },
        );
        h.coordinator.handle_message(&h.out, low);
        assert!(h.coordinator.deferred.contains("ENERGY"));

        let high = Envelope::new(
            Performative::Inform,
            address::SUPERVISOR,
            Content::ResourcePriority {
                level: PriorityLevel::High,
                resource: "ENERGY".into(),
                defer: false,
            },
        );
        h.coordinator.handle_message(&h.out, high);
        assert!(h.coordinator.deferred.is_empty());
    }
}
