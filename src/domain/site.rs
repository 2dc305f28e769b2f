use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Aggregated view of one site, recomputed from its unit directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteStatus {
    pub site_id: String,
    /// Mean load across every unit in the directory (0-100)
    pub load_average: f64,
    pub total_units: u32,
    pub operational_units: u32,
    pub failures: u32,
    pub completed_tasks: u64,
}

/// Severity attached to an escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl FromStr for Severity {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err("unknown severity"),
        }
    }
}

/// What a site coordinator could not resolve locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    Failure,
    NoResources,
    SiteOverload,
    Other(String),
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueKind::Failure => write!(f, "FAILURE"),
            IssueKind::NoResources => write!(f, "NO_RESOURCES"),
            IssueKind::SiteOverload => write!(f, "SITE_OVERLOAD"),
            IssueKind::Other(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for IssueKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err("issue is empty");
        }
        Ok(match normalized.as_str() {
            "FAILURE" => IssueKind::Failure,
            "NO_RESOURCES" => IssueKind::NoResources,
            "SITE_OVERLOAD" => IssueKind::SiteOverload,
            _ => IssueKind::Other(normalized),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_issue_is_preserved() {
        assert_eq!(
            "power_dip".parse::<IssueKind>(),
            Ok(IssueKind::Other("POWER_DIP".into()))
        );
        assert_eq!("failure".parse::<IssueKind>(), Ok(IssueKind::Failure));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Low < Severity::Medium);
        assert!("urgent".parse::<Severity>().is_err());
    }
}
