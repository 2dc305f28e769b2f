use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// A unit of work offered to a production unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// 1 (lowest) to 10 (highest)
    pub priority: u8,
    /// Mailbox name of whoever requested the work
    pub origin: String,
}

impl Task {
    /// Create a task, clamping the priority into 1..=10
    pub fn new(id: impl Into<String>, priority: u8, origin: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            origin: origin.into(),
        }
    }
}

/// Why a unit declined a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefusalReason {
    NotOperational,
    LoadHigh,
    QueueFull,
}

impl std::fmt::Display for RefusalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefusalReason::NotOperational => write!(f, "NOT_OPERATIONAL"),
            RefusalReason::LoadHigh => write!(f, "LOAD_HIGH"),
            RefusalReason::QueueFull => write!(f, "QUEUE_FULL"),
        }
    }
}

impl FromStr for RefusalReason {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "NOT_OPERATIONAL" => Ok(RefusalReason::NotOperational),
            "LOAD_HIGH" => Ok(RefusalReason::LoadHigh),
            "QUEUE_FULL" => Ok(RefusalReason::QueueFull),
            _ => Err("unknown refusal reason"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_is_clamped() {
        assert_eq!(Task::new("T1", 0, "gen").priority, 1);
        assert_eq!(Task::new("T1", 42, "gen").priority, 10);
        assert_eq!(Task::new("T1", 7, "gen").priority, 7);
    }

    #[test]
    fn test_refusal_reason_display_parses_back() {
        for reason in [
            RefusalReason::NotOperational,
            RefusalReason::LoadHigh,
            RefusalReason::QueueFull,
        ] {
            assert_eq!(reason.to_string().parse::<RefusalReason>(), Ok(reason));
        }
    }
}
