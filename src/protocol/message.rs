//! Typed message model exchanged between agents
//!
//! Every `Content` variant has a colon-delimited text form (see `wire`), so a
//! message can be logged, injected from the CLI or replayed from a capture.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::{
    Conflict, DirectiveAction, IssueKind, RefusalReason, Severity, SiteStatus, UnitType,
};

/// Speech-act label attached to every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Performative {
    Inform,
    Request,
    CallForProposal,
    Propose,
    Accept,
    Reject,
    Agree,
    Refuse,
    Confirm,
    Subscribe,
}

impl std::fmt::Display for Performative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Performative::Inform => write!(f, "INFORM"),
            Performative::Request => write!(f, "REQUEST"),
            Performative::CallForProposal => write!(f, "CFP"),
            Performative::Propose => write!(f, "PROPOSE"),
            Performative::Accept => write!(f, "ACCEPT"),
            Performative::Reject => write!(f, "REJECT"),
            Performative::Agree => write!(f, "AGREE"),
            Performative::Refuse => write!(f, "REFUSE"),
            Performative::Confirm => write!(f, "CONFIRM"),
            Performative::Subscribe => write!(f, "SUBSCRIBE"),
        }
    }
}

impl FromStr for Performative {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "INFORM" => Ok(Performative::Inform),
            "REQUEST" => Ok(Performative::Request),
            "CFP" | "CALL_FOR_PROPOSAL" => Ok(Performative::CallForProposal),
            "PROPOSE" => Ok(Performative::Propose),
            "ACCEPT" | "ACCEPT_PROPOSAL" => Ok(Performative::Accept),
            "REJECT" | "REJECT_PROPOSAL" => Ok(Performative::Reject),
            "AGREE" => Ok(Performative::Agree),
            "REFUSE" => Ok(Performative::Refuse),
            "CONFIRM" => Ok(Performative::Confirm),
            "SUBSCRIBE" => Ok(Performative::Subscribe),
            _ => Err("unknown performative"),
        }
    }
}

/// Level carried by a RESOURCE_PRIORITY notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriorityLevel {
    High,
    Low,
}

impl std::fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriorityLevel::High => write!(f, "HIGH"),
            PriorityLevel::Low => write!(f, "LOW"),
        }
    }
}

impl FromStr for PriorityLevel {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(PriorityLevel::High),
            "LOW" => Ok(PriorityLevel::Low),
            _ => Err("unknown priority level"),
        }
    }
}

/// Message payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Content {
    // --- unit <-> coordinator ---
    Register {
        unit: String,
        unit_type: UnitType,
        capacity: u32,
        operational: bool,
    },
    UnitRegistered {
        unit: String,
        site: String,
    },
    StatusUpdate {
        unit: String,
        load: f64,
        queue: u32,
        operational: bool,
    },
    TaskCompleted {
        task_id: String,
        unit: String,
    },
    Failure {
        unit: String,
        error_code: String,
    },
    Recovery {
        unit: String,
        detail: String,
    },
    Overload {
        unit: String,
        load: f64,
    },
    LoadBalancing {
        unit: String,
        load: f64,
        queue: u32,
    },
    TransferTasks {
        to: String,
        count: u32,
    },
    IncomingTasks {
        from: String,
        count: u32,
    },

    // --- task admission ---
    Task {
        task_id: String,
        priority: u8,
    },
    Accepted {
        task_id: String,
        eta_secs: f64,
    },
    Refused {
        task_id: String,
        reason: RefusalReason,
        load: f64,
    },
    CallForProposal {
        task_id: String,
        requirements: String,
    },
    Proposal {
        task_id: String,
        score: f64,
        eta_secs: f64,
        energy: f64,
    },
    Awarded {
        task_id: String,
    },
    Declined {
        task_id: String,
    },

    // --- peer gossip ---
    Ping {
        unit: String,
        load: f64,
        queue: u32,
        site: String,
    },
    Pong {
        unit: String,
        load: f64,
        operational: bool,
        spare_capacity: u32,
        site: String,
    },
    HelpOffer {
        unit: String,
        spare_capacity: u32,
    },
    HelpReply {
        unit: String,
        needs_help: bool,
    },

    // --- coordinator <-> supervisor ---
    RegisterSite {
        site: String,
    },
    SiteRegistered {
        site: String,
    },
    SiteStatus(SiteStatus),
    Escalation {
        site: String,
        issue: IssueKind,
        unit: String,
        severity: Severity,
    },
    Directive {
        action: DirectiveAction,
        unit: String,
        description: String,
    },
    AcceptLoad {
        from_site: String,
        priority: PriorityLevel,
    },
    TransferResource {
        resource: String,
        amount: u32,
        to_site: String,
    },
    IncomingResource {
        resource: String,
        amount: u32,
        from_site: String,
    },
    ResourceRequest {
        site: String,
        unit: String,
        resource: String,
        amount: u32,
    },
    ResourceGranted {
        resource: String,
        amount: u32,
    },
    ResourceUnavailable {
        resource: String,
    },
    ResourceRelease {
        site: String,
        resource: String,
        amount: u32,
    },
    ConflictReport(Conflict),
    ResourcePriority {
        level: PriorityLevel,
        resource: String,
        defer: bool,
    },
    InterSiteTask {
        task_id: String,
        priority: u8,
    },

    // --- transport service ---
    TransportRequest {
        from: String,
        to: String,
        product: String,
        priority: u8,
    },
    TransportAccepted {
        product: String,
        eta_secs: u64,
    },
    TransportRefused {
        product: String,
        reason: String,
    },
}

impl Content {
    /// Performative a sender uses for this payload unless it says otherwise
    pub fn performative(&self) -> Performative {
        match self {
            Content::Register { .. } | Content::RegisterSite { .. } => Performative::Subscribe,
            Content::UnitRegistered { .. }
            | Content::SiteRegistered { .. }
            | Content::TransportAccepted { .. } => Performative::Confirm,
            Content::Task { .. }
            | Content::LoadBalancing { .. }
            | Content::ResourceRequest { .. }
            | Content::InterSiteTask { .. }
            | Content::TransportRequest { .. }
            | Content::Escalation { .. }
            | Content::TransferTasks { .. }
            | Content::TransferResource { .. }
            | Content::AcceptLoad { .. } => Performative::Request,
            Content::Accepted { .. } | Content::ResourceGranted { .. } => Performative::Agree,
            Content::Refused { .. }
            | Content::ResourceUnavailable { .. }
            | Content::TransportRefused { .. } => Performative::Refuse,
            Content::CallForProposal { .. } => Performative::CallForProposal,
            Content::Proposal { .. } | Content::HelpOffer { .. } => Performative::Propose,
            Content::Awarded { .. } => Performative::Accept,
            Content::Declined { .. } => Performative::Reject,
            _ => Performative::Inform,
        }
    }

    /// Leading keyword of the wire form
    pub fn keyword(&self) -> &'static str {
        match self {
            Content::Register { .. } => "REGISTER",
            Content::UnitRegistered { .. } | Content::SiteRegistered { .. } => "REGISTERED",
            Content::StatusUpdate { .. } => "STATUS_UPDATE",
            Content::TaskCompleted { .. } => "TASK_COMPLETED",
            Content::Failure { .. } => "FAILURE",
            Content::Recovery { .. } => "RECOVERY",
            Content::Overload { .. } => "OVERLOAD",
            Content::LoadBalancing { .. } => "LOAD_BALANCING",
            Content::TransferTasks { .. } => "TRANSFER_TASKS",
            Content::IncomingTasks { .. } => "INCOMING_TASKS",
            Content::Task { .. } => "TASK",
            Content::Accepted { .. } => "ACCEPTED",
            Content::Refused { .. } => "REFUSED",
            Content::CallForProposal { .. } => "CFP",
            Content::Proposal { .. } => "PROPOSAL",
            Content::Awarded { .. } => "AWARDED",
            Content::Declined { .. } => "DECLINED",
            Content::Ping { .. } => "PING",
            Content::Pong { .. } => "PONG",
            Content::HelpOffer { .. } => "HELP_OFFER",
            Content::HelpReply { .. } => "HELP_REPLY",
            Content::RegisterSite { .. } => "REGISTER_SITE",
            Content::SiteStatus(_) => "SITE_STATUS",
            Content::Escalation { .. } => "ESCALATION",
            Content::Directive { .. } => "SUPERVISOR_DIRECTIVE",
            Content::AcceptLoad { .. } => "ACCEPT_LOAD",
            Content::TransferResource { .. } => "TRANSFER_RESOURCE",
            Content::IncomingResource { .. } => "INCOMING_RESOURCE",
            Content::ResourceRequest { .. } => "INTER_SITE_RESOURCE",
            Content::ResourceGranted { .. } => "RESOURCE_GRANTED",
            Content::ResourceUnavailable { .. } => "RESOURCE_UNAVAILABLE",
            Content::ResourceRelease { .. } => "RESOURCE_RELEASE",
            Content::ConflictReport(_) => "CONFLICT_INTER_SITE",
            Content::ResourcePriority { .. } => "RESOURCE_PRIORITY",
            Content::InterSiteTask { .. } => "INTER_SITE_TASK",
            Content::TransportRequest { .. } => "TRANSPORT_REQUEST",
            Content::TransportAccepted { .. } => "TRANSPORT_ACCEPTED",
            Content::TransportRefused { .. } => "TRANSPORT_REFUSED",
        }
    }
}

impl std::fmt::Display for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A message in flight: who sent it, how, and what
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub performative: Performative,
    pub sender: String,
    pub content: Content,
}

impl Envelope {
    pub fn new(performative: Performative, sender: impl Into<String>, content: Content) -> Self {
        Self {
            performative,
            sender: sender.into(),
            content,
        }
    }
}

impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.performative, self.sender, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_performatives() {
        let task = Content::Task {
            task_id: "T1".into(),
            priority: 5,
        };
        assert_eq!(task.performative(), Performative::Request);

        let refused = Content::Refused {
            task_id: "T1".into(),
            reason: RefusalReason::QueueFull,
            load: 10.0,
        };
        assert_eq!(refused.performative(), Performative::Refuse);

        let register = Content::RegisterSite { site: "A".into() };
        assert_eq!(register.performative(), Performative::Subscribe);

        let accept_load = Content::AcceptLoad {
            from_site: "A".into(),
            priority: PriorityLevel::High,
        };
        assert_eq!(accept_load.performative(), Performative::Request);
    }

    #[test]
    fn test_envelope_display() {
        let env = Envelope::new(
            Performative::Inform,
            "M1",
            Content::TaskCompleted {
                task_id: "T7".into(),
                unit: "M1".into(),
            },
        );
        assert_eq!(env.to_string(), "[INFORM] M1: TASK_COMPLETED:T7:M1");
    }

    #[test]
    fn test_performative_parse_accepts_aliases() {
        assert_eq!("cfp".parse(), Ok(Performative::CallForProposal));
        assert_eq!("accept-proposal".parse(), Ok(Performative::Accept));
        assert!("shout".parse::<Performative>().is_err());
    }
}
