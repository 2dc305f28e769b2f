//! TaskGenerator - drives the plant with work
//!
//! Sends plain tasks to random units through the text codec, periodic bursts
//! of urgent work, complex tasks put out to tender with a call for proposals,
//! and forwarded tasks for the site coordinators. Retries a refused task once
//! on another unit.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::agent::{Agent, Tier};
use crate::bus::{ticker, AgentContext, ControlCommand, Inbound, Outbox};
use crate::domain::MAX_PRIORITY;
use crate::error::Result;
use crate::protocol::{address, Content, Envelope, Performative};

use super::config::GeneratorConfig;

#[derive(Debug, Clone, Default, Serialize)]
pub struct GeneratorStats {
    pub generated: u64,
    pub accepted: u64,
    pub refused: u64,
    pub retried: u64,
    pub awarded: u64,
}

pub struct TaskGenerator {
    config: GeneratorConfig,
    units: Vec<String>,
    sites: Vec<String>,
    rng: StdRng,
    counter: u64,
    stats: GeneratorStats,
    /// Tasks whose one retry is still unanswered
    pending_retries: HashSet<String>,
    /// Open calls for proposals: task id → (unit, score) in arrival order
    open_calls: HashMap<String, Vec<(String, f64)>>,
}

impl TaskGenerator {
    pub fn new(config: GeneratorConfig, units: Vec<String>, sites: Vec<String>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            units,
            sites,
            rng,
            counter: 0,
            stats: GeneratorStats::default(),
            pending_retries: HashSet::new(),
            open_calls: HashMap::new(),
        }
    }

    pub fn stats(&self) -> &GeneratorStats {
        &self.stats
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}{:05}", self.counter)
    }

    fn random_unit(&mut self) -> Option<String> {
        self.units.choose(&mut self.rng).cloned()
    }

    fn send_task(&mut self, out: &Outbox, unit: &str, task_id: &str, priority: u8) {
        let text = format!("TASK:{task_id}:{priority}");
        match out.send_wire(unit, &text) {
            Ok(()) => debug!(unit, task = %text, "task sent"),
            Err(e) => warn!(unit, task = %text, error = %e, "task not delivered"),
        }
    }

    fn generate_task(&mut self, out: &Outbox) {
        let Some(unit) = self.random_unit() else {
            return;
        };
        let task_id = self.next_id("T");
        let priority = self.rng.gen_range(1..=MAX_PRIORITY);
        self.stats.generated += 1;
        self.send_task(out, &unit, &task_id, priority);
    }

    fn generate_burst(&mut self, out: &Outbox) {
        let (min, max) = (self.config.burst_min, self.config.burst_max);
        let size = if max > min {
            self.rng.gen_range(min..max)
        } else {
            min
        };
        info!(size, "task burst");
        for _ in 0..size {
            let Some(unit) = self.random_unit() else {
                return;
            };
            let task_id = self.next_id("B");
            let priority = self.rng.gen_range(7..=9);
            self.stats.generated += 1;
            self.send_task(out, &unit, &task_id, priority);
        }
    }

    fn open_call(&mut self, out: &Outbox, close_tx: &mpsc::Sender<String>) {
        if self.units.is_empty() {
            return;
        }
        let task_id = self.next_id("CX");
        self.stats.generated += 1;
        self.open_calls.insert(task_id.clone(), Vec::new());

        let call = Content::CallForProposal {
            task_id: task_id.clone(),
            requirements: "HIGH_CAPACITY".to_string(),
        };
        out.send_all(&self.units, &call);
        info!(task_id, units = self.units.len(), "call for proposals sent");

        let close_tx = close_tx.clone();
        let window = Duration::from_millis(self.config.cfp_window_ms);
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = close_tx.send(task_id).await;
        });
    }

    /// Award to the highest score; the first proposal wins ties
    fn close_call(&mut self, out: &Outbox, task_id: &str) {
        let Some(proposals) = self.open_calls.remove(task_id) else {
            return;
        };
        let best = proposals
            .iter()
            .fold(None, |best: Option<&(String, f64)>, p| match best {
                Some(b) if b.1 >= p.1 => Some(b),
                _ => Some(p),
            })
            .map(|(unit, score)| (unit.clone(), *score));

        let Some((winner, score)) = best else {
            warn!(task_id, "no proposals received");
            return;
        };

        for (unit, _) in &proposals {
            let content = if *unit == winner {
                Content::Awarded {
                    task_id: task_id.to_string(),
                }
            } else {
                Content::Declined {
                    task_id: task_id.to_string(),
                }
            };
            out.send(unit, content);
        }

        self.stats.awarded += 1;
        info!(task_id, winner = %winner, score, proposals = proposals.len(), "call for proposals awarded");
        let priority = self.config.retry_priority;
        self.send_task(out, &winner, task_id, priority);
    }

    fn generate_inter_site_task(&mut self, out: &Outbox) {
        let Some(site) = self.sites.choose(&mut self.rng).cloned() else {
            return;
        };
        let task_id = self.next_id("IS");
        self.stats.generated += 1;
        out.send(
            &address::coordinator(&site),
            Content::InterSiteTask {
                task_id,
                priority: self.config.retry_priority,
            },
        );
    }

    fn handle_message(&mut self, out: &Outbox, env: Envelope) {
        let sender = env.sender;
        match env.content {
            Content::Accepted { task_id, .. } => {
                self.stats.accepted += 1;
                let was_retry = self.pending_retries.remove(&task_id);
                debug!(task_id, unit = %sender, was_retry, "task accepted");
            }
            Content::Refused {
                task_id, reason, ..
            } => {
                self.stats.refused += 1;
                debug!(task_id, unit = %sender, %reason, "task refused");
                self.retry(out, &sender, task_id);
            }
            Content::Proposal {
                task_id, score, ..
            } => match self.open_calls.get_mut(&task_id) {
                Some(proposals) => proposals.push((sender, score)),
                None => debug!(task_id, unit = %sender, "late proposal ignored"),
            },
            other => debug!(from = %sender, message = %other, "generator ignoring message"),
        }
    }

    /// One retry per task, on a different unit
    fn retry(&mut self, out: &Outbox, refused_by: &str, task_id: String) {
        if self.pending_retries.remove(&task_id) {
            debug!(task_id, unit = refused_by, "retry refused, task dropped");
            return;
        }
        let others: Vec<&String> = self.units.iter().filter(|u| *u != refused_by).collect();
        let Some(unit) = others.choose(&mut self.rng).map(|u| u.to_string()) else {
            return;
        };
        self.pending_retries.insert(task_id.clone());
        self.stats.retried += 1;
        let priority = self.config.retry_priority;
        self.send_task(out, &unit, &task_id, priority);
    }

    fn log_stats(&self) {
        let acceptance = if self.stats.accepted + self.stats.refused == 0 {
            0.0
        } else {
            self.stats.accepted as f64 / (self.stats.accepted + self.stats.refused) as f64 * 100.0
        };
        info!(
            generated = self.stats.generated,
            accepted = self.stats.accepted,
            refused = self.stats.refused,
            retried = self.stats.retried,
            awarded = self.stats.awarded,
            acceptance,
            "generator statistics"
        );
    }

    fn handle_control(&self, cmd: ControlCommand) {
        match cmd {
            ControlCommand::Report(reply) => {
                let value = serde_json::to_value(&self.stats).unwrap_or_default();
                let _ = reply.send(value);
            }
        }
    }
}

#[async_trait]
impl Agent for TaskGenerator {
    fn name(&self) -> &str {
        address::GENERATOR
    }

    fn tier(&self) -> Tier {
        Tier::Collaborator
    }

    async fn run(mut self, ctx: AgentContext) -> Result<()> {
        let (out, mut inbox, mut shutdown_rx) = ctx.into_parts();
        let (close_tx, mut close_rx) = mpsc::channel::<String>(16);

        let mut task_tick = ticker(self.config.task_period_ms);
        let mut burst_tick = ticker(self.config.burst_period_ms);
        let mut cfp_tick = ticker(self.config.cfp_period_ms);
        let mut inter_site_tick = ticker(self.config.inter_site_period_ms);
        let mut stats_tick = ticker(self.config.stats_period_ms);
        let cfp_enabled = self.config.cfp_period_ms > 0;
        let inter_site_enabled = self.config.inter_site_period_ms > 0;

        info!(units = self.units.len(), sites = self.sites.len(), "task generator started");

        loop {
            tokio::select! {
                Some(inbound) = inbox.recv() => match inbound {
                    Inbound::Message(env) => self.handle_message(&out, env),
                    Inbound::Control(cmd) => self.handle_control(cmd),
                },

                Some(task_id) = close_rx.recv() => self.close_call(&out, &task_id),

                _ = task_tick.tick() => self.generate_task(&out),
                _ = burst_tick.tick() => self.generate_burst(&out),
                _ = cfp_tick.tick(), if cfp_enabled => self.open_call(&out, &close_tx),
                _ = inter_site_tick.tick(), if inter_site_enabled => self.generate_inter_site_task(&out),
                _ = stats_tick.tick() => self.log_stats(),

                _ = shutdown_rx.recv() => {
                    info!("task generator: shutdown signal received");
                    break;
                }
            }
        }

        self.log_stats();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::DirectoryBuilder;
    use crate::domain::RefusalReason;

    fn harness() -> (TaskGenerator, Outbox, Vec<mpsc::Receiver<Inbound>>) {
        let mut builder = DirectoryBuilder::new(64);
        let own = builder.register(address::GENERATOR).unwrap();
        let units: Vec<mpsc::Receiver<Inbound>> = ["M1", "M2"]
            .iter()
            .map(|u| builder.register(*u).unwrap())
            .collect();
        let directory = builder.build();
        let (_tx, shutdown) = tokio::sync::broadcast::channel(1);
        let ctx = AgentContext::new(address::GENERATOR, directory, own, shutdown);
        let generator = TaskGenerator::new(
            GeneratorConfig::default(),
            vec!["M1".into(), "M2".into()],
            vec!["A".into()],
            Some(42),
        );
        (generator, ctx.outbox(), units)
    }

    fn drain(rx: &mut mpsc::Receiver<Inbound>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(Inbound::Message(env)) = rx.try_recv() {
            out.push(env);
        }
        out
    }

    #[test]
    fn test_refused_task_is_retried_once_elsewhere() {
        let (mut generator, out, mut units) = harness();
        let refused = || {
            Envelope::new(
                Performative::Refuse,
                "M1",
                Content::Refused {
                    task_id: "T00001".into(),
                    reason: RefusalReason::QueueFull,
                    load: 100.0,
                },
            )
        };

        generator.handle_message(&out, refused());
        generator.handle_message(&out, refused());

        assert!(drain(&mut units[0]).is_empty());
        let retries = drain(&mut units[1]);
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0].performative, Performative::Request);
        assert_eq!(
            retries[0].content,
            Content::Task {
                task_id: "T00001".into(),
                priority: 8
            }
        );
        assert_eq!(generator.stats().refused, 2);
        assert_eq!(generator.stats().retried, 1);
        assert!(generator.pending_retries.is_empty());
    }

    #[test]
    fn test_accepted_retry_is_forgotten() {
        let (mut generator, out, mut units) = harness();
        generator.handle_message(
            &out,
            Envelope::new(
                Performative::Refuse,
                "M1",
                Content::Refused {
                    task_id: "T00007".into(),
                    reason: RefusalReason::LoadHigh,
                    load: 95.0,
                },
            ),
        );
        assert!(generator.pending_retries.contains("T00007"));
        assert_eq!(drain(&mut units[1]).len(), 1);

        generator.handle_message(
            &out,
            Envelope::new(
                Performative::Agree,
                "M2",
                Content::Accepted {
                    task_id: "T00007".into(),
                    eta_secs: 5.0,
                },
            ),
        );
        assert!(generator.pending_retries.is_empty());
        assert_eq!(generator.stats().accepted, 1);
    }

    #[test]
    fn test_call_for_proposals_awards_best_score() {
        let (mut generator, out, mut units) = harness();
        generator.open_calls.insert("CX00001".into(), Vec::new());

        for (unit, score) in [("M1", 0.6), ("M2", 0.9)] {
            generator.handle_message(
                &out,
                Envelope::new(
                    Performative::Propose,
                    unit,
                    Content::Proposal {
                        task_id: "CX00001".into(),
                        score,
                        eta_secs: 2.0,
                        energy: 50.0,
                    },
                ),
            );
        }
        generator.close_call(&out, "CX00001");

        let m1: Vec<Content> = drain(&mut units[0]).into_iter().map(|e| e.content).collect();
        let m2: Vec<Content> = drain(&mut units[1]).into_iter().map(|e| e.content).collect();
        assert_eq!(
            m1,
            vec![Content::Declined {
                task_id: "CX00001".into()
            }]
        );
        assert_eq!(
            m2,
            vec![
                Content::Awarded {
                    task_id: "CX00001".into()
                },
                Content::Task {
                    task_id: "CX00001".into(),
                    priority: 8
                },
            ]
        );
        assert_eq!(generator.stats().awarded, 1);
    }

    #[test]
    fn test_burst_priorities_are_urgent() {
        let (mut generator, out, mut units) = harness();
        generator.generate_burst(&out);

        let sent: Vec<Envelope> = units.iter_mut().flat_map(drain).collect();
        assert!(sent.len() >= 5 && sent.len() < 15);
        for env in sent {
            match env.content {
                Content::Task { priority, .. } => assert!((7..=9).contains(&priority)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
