//! Arbitration rules. Pure: they read the registry and return what to do;
//! the supervisor turns the result into messages and history entries.

use serde::Serialize;

use crate::domain::{DirectiveAction, IssueKind};

use super::config::SupervisorConfig;
use super::registry::SiteRegistry;

/// Extra messages that go with a directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SideEffect {
    /// `TRANSFER_RESOURCE` to the donor, `INCOMING_RESOURCE` to the recipient
    TransferResource {
        donor: String,
        recipient: String,
        resource: String,
        amount: u32,
    },
    /// `ACCEPT_LOAD` to a site taking work from `from_site`
    AcceptLoad { candidate: String, from_site: String },
}

/// Outcome of one escalation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub action: DirectiveAction,
    /// Sites that receive the directive; empty means none is sent
    pub recipients: Vec<String>,
    /// Sites other than the source involved in the outcome
    pub targets: Vec<String>,
    pub description: String,
    pub side_effects: Vec<SideEffect>,
}

impl Resolution {
    fn new(action: DirectiveAction, description: String) -> Self {
        Self {
            action,
            recipients: Vec::new(),
            targets: Vec::new(),
            description,
            side_effects: Vec::new(),
        }
    }
}

/// Decide what an escalation from `site` about `unit` turns into
pub fn resolve_escalation(
    registry: &SiteRegistry,
    config: &SupervisorConfig,
    site: &str,
    issue: &IssueKind,
    unit: &str,
) -> Resolution {
    match issue {
        IssueKind::Failure => match registry.best_candidate(site, config.candidate_load) {
            Some(best) => {
                let mut r = Resolution::new(
                    DirectiveAction::Reallocate,
                    format!("reallocate work of {unit} from site {site} to site {}", best.site_id),
                );
                r.recipients = vec![site.to_string(), best.site_id.clone()];
                r.targets = vec![best.site_id.clone()];
                r
            }
            None => {
                let mut r = Resolution::new(
                    DirectiveAction::DegradedMode,
                    format!("no site can absorb work of {unit}; run degraded"),
                );
                r.recipients = vec![site.to_string()];
                r
            }
        },

        IssueKind::NoResources => match registry.first_donor(site, config.donor_load) {
            Some(donor) => {
                let mut r = Resolution::new(
                    DirectiveAction::ResourceTransfer,
                    format!(
                        "site {} transfers {} {} to site {site}",
                        donor.site_id, config.transfer_amount, config.transfer_resource
                    ),
                );
                r.recipients = vec![site.to_string(), donor.site_id.clone()];
                r.targets = vec![donor.site_id.clone()];
                r.side_effects.push(SideEffect::TransferResource {
                    donor: donor.site_id.clone(),
                    recipient: site.to_string(),
                    resource: config.transfer_resource.clone(),
                    amount: config.transfer_amount,
                });
                r
            }
            None => {
                let mut r = Resolution::new(
                    DirectiveAction::OptimizeGlobally,
                    format!("no donor for site {site}; optimise globally"),
                );
                r.recipients = registry.site_ids();
                r.targets = r.recipients.iter().filter(|s| *s != site).cloned().collect();
                r
            }
        },

        IssueKind::SiteOverload => {
            let candidates: Vec<String> = registry
                .candidates(site, config.candidate_load)
                .into_iter()
                .map(|r| r.site_id.clone())
                .collect();

            if candidates.len() >= 2 {
                let mut r = Resolution::new(
                    DirectiveAction::LoadDistribution,
                    format!("distribute load of site {site} over {}", candidates.join(",")),
                );
                r.recipients = std::iter::once(site.to_string())
                    .chain(candidates.iter().cloned())
                    .collect();
                r.side_effects = candidates
                    .iter()
                    .map(|c| SideEffect::AcceptLoad {
                        candidate: c.clone(),
                        from_site: site.to_string(),
                    })
                    .collect();
                r.targets = candidates;
                r
            } else {
                let mut r = Resolution::new(
                    DirectiveAction::Throttle,
                    format!("not enough spare sites; throttle site {site}"),
                );
                r.recipients = vec![site.to_string()];
                r
            }
        }

        IssueKind::Other(name) => Resolution::new(
            DirectiveAction::Monitor,
            format!("monitoring {name} at site {site}"),
        ),
    }
}

/// Winner and loser of a resource contention: higher cached score wins,
/// ties go to `site_1`, unknown sites count as `unknown_score`
pub fn resolve_contention<'a>(
    registry: &SiteRegistry,
    site_1: &'a str,
    site_2: &'a str,
    unknown_score: u8,
) -> (&'a str, &'a str) {
    let score_1 = registry.score(site_1).unwrap_or(unknown_score);
    let score_2 = registry.score(site_2).unwrap_or(unknown_score);
    if score_1 >= score_2 {
        (site_1, site_2)
    } else {
        (site_2, site_1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SiteStatus;

    fn report(registry: &mut SiteRegistry, site: &str, load: f64, total: u32, operational: u32, failures: u32) {
        registry.ingest(SiteStatus {
            site_id: site.into(),
            load_average: load,
            total_units: total,
            operational_units: operational,
            failures,
            completed_tasks: 0,
        });
    }

    #[test]
    fn test_failure_reallocates_to_best_scoring_site() {
        let mut registry = SiteRegistry::new();
        report(&mut registry, "A", 80.0, 2, 1, 1);
        report(&mut registry, "B", 65.0, 2, 2, 2);
        report(&mut registry, "C", 60.0, 2, 2, 0);
        let config = SupervisorConfig::default();

        let r = resolve_escalation(&registry, &config, "A", &IssueKind::Failure, "M2");
        assert_eq!(r.action, DirectiveAction::Reallocate);
        assert_eq!(r.recipients, vec!["A".to_string(), "C".to_string()]);
        assert_eq!(r.targets, vec!["C".to_string()]);
    }

    #[test]
    fn test_failure_without_candidates_degrades() {
        let mut registry = SiteRegistry::new();
        report(&mut registry, "A", 80.0, 2, 1, 1);
        report(&mut registry, "B", 75.0, 2, 2, 0);
        let r = resolve_escalation(
            &registry,
            &SupervisorConfig::default(),
            "A",
            &IssueKind::Failure,
            "M2",
        );
        assert_eq!(r.action, DirectiveAction::DegradedMode);
        assert_eq!(r.recipients, vec!["A".to_string()]);
    }

    #[test]
    fn test_no_resources_uses_first_donor() {
        let mut registry = SiteRegistry::new();
        report(&mut registry, "A", 88.0, 2, 2, 0);
        report(&mut registry, "C", 10.0, 2, 2, 0);
        report(&mut registry, "B", 40.0, 2, 2, 0);
        let config = SupervisorConfig::default();

        let r = resolve_escalation(&registry, &config, "A", &IssueKind::NoResources, "M1");
        assert_eq!(r.action, DirectiveAction::ResourceTransfer);
        assert_eq!(
            r.side_effects,
            vec![SideEffect::TransferResource {
                donor: "B".into(),
                recipient: "A".into(),
                resource: "PROCESSING".into(),
                amount: 50,
            }]
        );
    }

    #[test]
    fn test_no_resources_without_donor_broadcasts() {
        let mut registry = SiteRegistry::new();
        report(&mut registry, "A", 88.0, 2, 2, 0);
        report(&mut registry, "B", 60.0, 2, 2, 0);
        let r = resolve_escalation(
            &registry,
            &SupervisorConfig::default(),
            "A",
            &IssueKind::NoResources,
            "M1",
        );
        assert_eq!(r.action, DirectiveAction::OptimizeGlobally);
        assert_eq!(r.recipients, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(r.targets, vec!["B".to_string()]);
    }

    #[test]
    fn test_overload_needs_two_candidates() {
        let mut registry = SiteRegistry::new();
        report(&mut registry, "A", 96.0, 2, 2, 0);
        report(&mut registry, "B", 30.0, 2, 2, 0);
        let config = SupervisorConfig::default();

        let r = resolve_escalation(&registry, &config, "A", &IssueKind::SiteOverload, "M1");
        assert_eq!(r.action, DirectiveAction::Throttle);
        assert!(r.side_effects.is_empty());

        report(&mut registry, "C", 50.0, 1, 1, 0);
        let r = resolve_escalation(&registry, &config, "A", &IssueKind::SiteOverload, "M1");
        assert_eq!(r.action, DirectiveAction::LoadDistribution);
        assert_eq!(r.recipients.len(), 3);
        assert_eq!(r.side_effects.len(), 2);
    }

    #[test]
    fn test_unknown_issue_is_only_monitored() {
        let registry = SiteRegistry::new();
        let r = resolve_escalation(
            &registry,
            &SupervisorConfig::default(),
            "A",
            &IssueKind::Other("POWER_DIP".into()),
            "M1",
        );
        assert_eq!(r.action, DirectiveAction::Monitor);
        assert!(r.recipients.is_empty());
    }

    #[test]
    fn test_contention_prefers_higher_score_then_first_site() {
        let mut registry = SiteRegistry::new();
        // 0.4*100 + 0.4*100 + 0.2*0 = 80
        report(&mut registry, "A", 60.0, 1, 1, 5);
        // 0.4*60 + 0.4*50 + 0.2*80 = 60
        report(&mut registry, "B", 100.0, 2, 1, 1);
        assert_eq!(registry.score("A"), Some(80));
        assert_eq!(registry.score("B"), Some(60));

        assert_eq!(resolve_contention(&registry, "B", "A", 50), ("A", "B"));
        assert_eq!(resolve_contention(&registry, "X", "Y", 50), ("X", "Y"));
        assert_eq!(resolve_contention(&registry, "B", "X", 50), ("B", "X"));
    }
}
