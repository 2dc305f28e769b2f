use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Kind of inter-site conflict reported to the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    ResourceContention,
    PriorityConflict,
    LoadImbalance,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::ResourceContention => write!(f, "RESOURCE_CONTENTION"),
            ConflictKind::PriorityConflict => write!(f, "PRIORITY_CONFLICT"),
            ConflictKind::LoadImbalance => write!(f, "LOAD_IMBALANCE"),
        }
    }
}

impl FromStr for ConflictKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "RESOURCE_CONTENTION" => Ok(ConflictKind::ResourceContention),
            "PRIORITY_CONFLICT" => Ok(ConflictKind::PriorityConflict),
            "LOAD_IMBALANCE" => Ok(ConflictKind::LoadImbalance),
            _ => Err("unknown conflict kind"),
        }
    }
}

/// A pending inter-site conflict, discarded once resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub site_1: String,
    pub site_2: String,
    pub resource: Option<String>,
}

/// Action carried by a supervisor directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectiveAction {
    Reallocate,
    DegradedMode,
    ResourceTransfer,
    OptimizeGlobally,
    LoadDistribution,
    Throttle,
    ReduceLoad,
    Monitor,
    Other(String),
}

impl DirectiveAction {
    /// Directives that make a site stop taking forwarded work for a while
    pub fn is_throttling(&self) -> bool {
        matches!(self, DirectiveAction::Throttle | DirectiveAction::ReduceLoad)
    }
}

impl std::fmt::Display for DirectiveAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectiveAction::Reallocate => write!(f, "REALLOCATE"),
            DirectiveAction::DegradedMode => write!(f, "DEGRADED_MODE"),
            DirectiveAction::ResourceTransfer => write!(f, "RESOURCE_TRANSFER"),
            DirectiveAction::OptimizeGlobally => write!(f, "OPTIMIZE_GLOBALLY"),
            DirectiveAction::LoadDistribution => write!(f, "LOAD_DISTRIBUTION"),
            DirectiveAction::Throttle => write!(f, "THROTTLE"),
            DirectiveAction::ReduceLoad => write!(f, "REDUCE_LOAD"),
            DirectiveAction::Monitor => write!(f, "MONITOR"),
            DirectiveAction::Other(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for DirectiveAction {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err("directive action is empty");
        }
        Ok(match normalized.as_str() {
            "REALLOCATE" => DirectiveAction::Reallocate,
            "DEGRADED_MODE" => DirectiveAction::DegradedMode,
            "RESOURCE_TRANSFER" => DirectiveAction::ResourceTransfer,
            "OPTIMIZE_GLOBALLY" => DirectiveAction::OptimizeGlobally,
            "LOAD_DISTRIBUTION" => DirectiveAction::LoadDistribution,
            "THROTTLE" => DirectiveAction::Throttle,
            "REDUCE_LOAD" => DirectiveAction::ReduceLoad,
            "MONITOR" => DirectiveAction::Monitor,
            _ => DirectiveAction::Other(normalized),
        })
    }
}

/// An arbitration outcome recorded by the supervisor. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    id: Uuid,
    issue: String,
    action: DirectiveAction,
    source_site: String,
    target_sites: Vec<String>,
    unit: String,
    description: String,
    timestamp: DateTime<Utc>,
}

impl Decision {
    pub fn new(
        issue: impl Into<String>,
        action: DirectiveAction,
        source_site: impl Into<String>,
        target_sites: Vec<String>,
        unit: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            issue: issue.into(),
            action,
            source_site: source_site.into(),
            target_sites,
            unit: unit.into(),
            description: description.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn issue(&self) -> &str {
        &self.issue
    }

    pub fn action(&self) -> &DirectiveAction {
        &self.action
    }

    pub fn source_site(&self) -> &str {
        &self.source_site
    }

    pub fn target_sites(&self) -> &[String] {
        &self.target_sites
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_action_parse() {
        assert_eq!("throttle".parse(), Ok(DirectiveAction::Throttle));
        assert_eq!(
            "quarantine".parse(),
            Ok(DirectiveAction::Other("QUARANTINE".into()))
        );
        assert!(DirectiveAction::ReduceLoad.is_throttling());
        assert!(!DirectiveAction::Reallocate.is_throttling());
    }

    #[test]
    fn test_decisions_get_distinct_ids() {
        let a = Decision::new("FAILURE", DirectiveAction::DegradedMode, "A", vec![], "M2", "x");
        let b = Decision::new("FAILURE", DirectiveAction::DegradedMode, "A", vec![], "M2", "x");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.source_site(), "A");
        assert!(a.target_sites().is_empty());
    }
}
