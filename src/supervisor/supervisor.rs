//! GlobalSupervisor - tier 3, one per plant
//!
//! Sole owner of the site registry, the shared resource pools, the conflict
//! queue and the decision history. Everything else sees them only through
//! `Report` snapshots.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

use crate::agent::{Agent, Tier};
use crate::bus::{ticker, AgentContext, ControlCommand, Inbound, Outbox};
use crate::domain::{
    Conflict, ConflictKind, Decision, DirectiveAction, IssueKind, ResourcePool, Severity,
    SiteStatus,
};
use crate::error::{PlantError, Result};
use crate::protocol::{address, Content, Envelope, Performative, PriorityLevel};

use super::arbitration::{resolve_contention, resolve_escalation, Resolution, SideEffect};
use super::config::SupervisorConfig;
use super::registry::{SiteRecord, SiteRegistry};
use super::resources::ResourceLedger;

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorSnapshot {
    pub sites: Vec<SiteRecord>,
    pub pools: Vec<ResourcePool>,
    pub decisions: Vec<Decision>,
    pub pending_conflicts: Vec<Conflict>,
    pub escalations: u64,
    pub resolved_conflicts: u64,
    pub global_load: Option<f64>,
}

pub struct GlobalSupervisor {
    config: SupervisorConfig,
    registry: SiteRegistry,
    ledger: ResourceLedger,
    conflicts: VecDeque<Conflict>,
    history: Vec<Decision>,
    escalations: u64,
    resolved_conflicts: u64,
}

impl GlobalSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let ledger = ResourceLedger::new(&config.pools);
        Self {
            config,
            registry: SiteRegistry::new(),
            ledger,
            conflicts: VecDeque::new(),
            history: Vec::new(),
            escalations: 0,
            resolved_conflicts: 0,
        }
    }

    pub fn history(&self) -> &[Decision] {
        &self.history
    }

    pub fn snapshot(&self) -> SupervisorSnapshot {
        SupervisorSnapshot {
            sites: self.registry.records().cloned().collect(),
            pools: self.ledger.pools().cloned().collect(),
            decisions: self.history.clone(),
            pending_conflicts: self.conflicts.iter().cloned().collect(),
            escalations: self.escalations,
            resolved_conflicts: self.resolved_conflicts,
            global_load: self.registry.weighted_load(),
        }
    }

    fn handle_message(&mut self, out: &Outbox, env: Envelope) {
        let sender = env.sender;
        match env.content {
            Content::RegisterSite { site } => self.register_site(out, &site),
            Content::SiteStatus(status) => self.ingest_status(status),
            Content::Escalation {
                site,
                issue,
                unit,
                severity,
            } => self.handle_escalation(out, &site, issue, &unit, severity),
            Content::ResourceRequest {
                site,
                unit,
                resource,
                amount,
            } => self.allocate_resource(out, &sender, &site, &unit, &resource, amount),
            Content::ResourceRelease {
                site,
                resource,
                amount,
            } => match self.ledger.release(&resource, amount) {
                Ok(credited) => {
                    info!(site, resource, amount, credited, "resource released to pool");
                }
                Err(e) => warn!(site, resource, error = %e, "release for unknown pool ignored"),
            },
            Content::ConflictReport(conflict) => self.enqueue_conflict(conflict),
            other => {
                debug!(from = %sender, message = %other, "supervisor ignoring message");
            }
        }
    }

    fn register_site(&mut self, out: &Outbox, site: &str) {
        self.registry.register(site);
        info!(site, sites = self.registry.len(), "site registered");
        out.send(
            &address::coordinator(site),
            Content::SiteRegistered {
                site: site.to_string(),
            },
        );
    }

    fn ingest_status(&mut self, status: SiteStatus) {
        let site = status.site_id.clone();
        let load = status.load_average;
        let score = self.registry.ingest(status);
        debug!(site, load, score, "site status ingested");
    }

    fn handle_escalation(
        &mut self,
        out: &Outbox,
        site: &str,
        issue: IssueKind,
        unit: &str,
        severity: Severity,
    ) {
        self.escalations += 1;
        warn!(site, %issue, unit, %severity, total = self.escalations, "escalation received");

        let resolution = resolve_escalation(&self.registry, &self.config, site, &issue, unit);
        self.apply_resolution(out, site, unit, &issue.to_string(), resolution);
    }

    fn apply_resolution(
        &mut self,
        out: &Outbox,
        site: &str,
        unit: &str,
        issue: &str,
        resolution: Resolution,
    ) {
        for effect in &resolution.side_effects {
            match effect {
                SideEffect::TransferResource {
                    donor,
                    recipient,
                    resource,
                    amount,
                } => self.orchestrate_transfer(out, donor, recipient, resource, *amount),
                SideEffect::AcceptLoad {
                    candidate,
                    from_site,
                } => out.send(
                    &address::coordinator(candidate),
                    Content::AcceptLoad {
                        from_site: from_site.clone(),
                        priority: PriorityLevel::High,
                    },
                ),
            }
        }

        let directive = Content::Directive {
            action: resolution.action.clone(),
            unit: unit.to_string(),
            description: resolution.description.clone(),
        };
        for recipient in &resolution.recipients {
            out.send_as(
                &address::coordinator(recipient),
                Performative::Request,
                directive.clone(),
            );
        }

        info!(
            site,
            unit,
            action = %resolution.action,
            targets = ?resolution.targets,
            "decision recorded"
        );
        self.history.push(Decision::new(
            issue,
            resolution.action,
            site,
            resolution.targets,
            unit,
            resolution.description,
        ));
    }

    fn orchestrate_transfer(
        &self,
        out: &Outbox,
        donor: &str,
        recipient: &str,
        resource: &str,
        amount: u32,
    ) {
        info!(donor, recipient, resource, amount, "orchestrating resource transfer");
        out.send(
            &address::coordinator(donor),
            Content::TransferResource {
                resource: resource.to_string(),
                amount,
                to_site: recipient.to_string(),
            },
        );
        out.send(
            &address::coordinator(recipient),
            Content::IncomingResource {
                resource: resource.to_string(),
                amount,
                from_site: donor.to_string(),
            },
        );
    }

    fn allocate_resource(
        &mut self,
        out: &Outbox,
        reply_to: &str,
        site: &str,
        unit: &str,
        resource: &str,
        amount: u32,
    ) {
        match self.ledger.allocate(resource, amount) {
            Ok(()) => {
                info!(site, unit, resource, amount, "resource granted from global pool");
                out.send(
                    reply_to,
                    Content::ResourceGranted {
                        resource: resource.to_string(),
                        amount,
                    },
                );
            }
            Err(PlantError::ResourceExhausted { available, .. }) => {
                let donor = self
                    .registry
                    .first_donor(site, self.config.donor_load)
                    .map(|r| r.site_id.clone());
                match donor {
                    Some(donor) => {
                        info!(site, resource, amount, available, donor = %donor, "pool short, transferring from donor");
                        self.orchestrate_transfer(out, &donor, site, resource, amount);
                    }
                    None => self.refuse_resource(out, reply_to, site, resource),
                }
            }
            Err(e) => {
                debug!(site, resource, error = %e, "resource request refused");
                self.refuse_resource(out, reply_to, site, resource);
            }
        }
    }

    fn refuse_resource(&self, out: &Outbox, reply_to: &str, site: &str, resource: &str) {
        warn!(site, resource, "resource unavailable");
        out.send(
            reply_to,
            Content::ResourceUnavailable {
                resource: resource.to_string(),
            },
        );
    }

    fn enqueue_conflict(&mut self, conflict: Conflict) {
        info!(
            kind = %conflict.kind,
            site_1 = %conflict.site_1,
            site_2 = %conflict.site_2,
            pending = self.conflicts.len() + 1,
            "conflict queued"
        );
        self.conflicts.push_back(conflict);
    }

    /// Drain the conflict queue in arrival order
    fn resolve_conflicts(&mut self, out: &Outbox) {
        while let Some(conflict) = self.conflicts.pop_front() {
            match conflict.kind {
                ConflictKind::ResourceContention => {
                    let resource = conflict
                        .resource
                        .clone()
                        .unwrap_or_else(|| "UNSPECIFIED".to_string());
                    let (winner, loser) = resolve_contention(
                        &self.registry,
                        &conflict.site_1,
                        &conflict.site_2,
                        self.config.unknown_score,
                    );
                    info!(winner, loser, resource, "resource contention arbitrated");
                    out.send(
                        &address::coordinator(winner),
                        Content::ResourcePriority {
                            level: PriorityLevel::High,
                            resource: resource.clone(),
                            defer: false,
                        },
                    );
                    out.send(
                        &address::coordinator(loser),
                        Content::ResourcePriority {
                            level: PriorityLevel::Low,
                            resource,
                            defer: true,
                        },
                    );
                }
                ConflictKind::LoadImbalance => {
                    info!(from = %conflict.site_1, to = %conflict.site_2, "load imbalance: shifting load");
                    out.send(
                        &address::coordinator(&conflict.site_2),
                        Content::AcceptLoad {
                            from_site: conflict.site_1.clone(),
                            priority: PriorityLevel::High,
                        },
                    );
                }
                ConflictKind::PriorityConflict => {
                    info!(site_1 = %conflict.site_1, site_2 = %conflict.site_2, "priority conflict noted");
                }
            }
            self.resolved_conflicts += 1;
        }
    }

    fn analyze_system(&mut self, out: &Outbox) {
        let Some(global_load) = self.registry.weighted_load() else {
            debug!("no site reports yet, skipping analysis");
            return;
        };
        info!(global_load, sites = self.registry.len(), "system analysis");

        if global_load > self.config.reduce_load_threshold {
            warn!(global_load, "global load critical, reducing load everywhere");
            let description = "THROTTLE_NEW_TASKS".to_string();
            let sites = self.registry.site_ids();
            for site in &sites {
                out.send_as(
                    &address::coordinator(site),
                    Performative::Request,
                    Content::Directive {
                        action: DirectiveAction::ReduceLoad,
                        unit: "ALL".to_string(),
                        description: description.clone(),
                    },
                );
            }
            self.history.push(Decision::new(
                "SYSTEM_LOAD",
                DirectiveAction::ReduceLoad,
                "ALL",
                sites,
                "ALL",
                description,
            ));
        }

        if self.escalations > self.config.maintenance_escalations {
            warn!(escalations = self.escalations, "escalation count high, preventive maintenance advised");
        }

        if let Some((max, min)) = self.registry.load_extremes() {
            let spread = max.load() - min.load();
            if spread > self.config.imbalance_spread {
                info!(from = %max.site_id, to = %min.site_id, spread, "rebalancing sites");
                out.send(
                    &address::coordinator(&min.site_id),
                    Content::AcceptLoad {
                        from_site: max.site_id.clone(),
                        priority: PriorityLevel::High,
                    },
                );
            }
        }

        for pool in self.ledger.strained(self.config.pool_warning_utilization) {
            warn!(
                resource = pool.name(),
                available = pool.available(),
                total = pool.total(),
                "resource pool nearly exhausted"
            );
        }
    }

    fn strategic_plan(&self) {
        match self.registry.weighted_load() {
            Some(load) if load > self.config.planning_trend_load => {
                info!(global_load = load, "load trending up, plan for added capacity");
            }
            Some(load) => debug!(global_load = load, "capacity plan unchanged"),
            None => {}
        }
    }

    fn global_report(&self) {
        info!(
            sites = self.registry.len(),
            global_load = ?self.registry.weighted_load(),
            escalations = self.escalations,
            resolved_conflicts = self.resolved_conflicts,
            decisions = self.history.len(),
            "global report"
        );
        for record in self.registry.records() {
            debug!(site = %record.site_id, score = record.score, load = record.load(), "site score");
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
impl Agent for GlobalSupervisor {
    fn name(&self) -> &str {
        address::SUPERVISOR
    }

    fn tier(&self) -> Tier {
        Tier::Global
    }

    async fn run(mut self, ctx: AgentContext) -> Result<()> {
        let (out, mut inbox, mut shutdown_rx) = ctx.into_parts();
        info!(pools = self.ledger.pools().count(), "supervisor starting main loop");

        let mut conflict_tick = ticker(self.config.conflict_period_ms);
        let mut analysis_tick = ticker(self.config.analysis_period_ms);
        let mut planning_tick = ticker(self.config.planning_period_ms);
        let mut report_tick = ticker(self.config.report_period_ms);

        loop {
            tokio::select! {
                Some(inbound) = inbox.recv() => match inbound {
                    Inbound::Message(env) => self.handle_message(&out, env),
                    Inbound::Control(cmd) => self.handle_control(cmd),
                },

                _ = conflict_tick.tick() => self.resolve_conflicts(&out),
                _ = analysis_tick.tick() => self.analyze_system(&out),
                _ = planning_tick.tick() => self.strategic_plan(),
                _ = report_tick.tick() => self.global_report(),

                _ = shutdown_rx.recv() => {
                    info!("supervisor: shutdown signal received");
                    break;
                }
            }
        }

        info!(decisions = self.history.len(), "supervisor: main loop exited");
        Ok(())
    }
}
