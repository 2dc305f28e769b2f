use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of production step a unit performs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UnitType {
    Distribution,
    Machining,
    Assembly,
    QualityControl,
    /// Any other station kind declared in the topology
    Custom(String),
}

impl std::fmt::Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitType::Distribution => write!(f, "DISTRIBUTION"),
            UnitType::Machining => write!(f, "MACHINING"),
            UnitType::Assembly => write!(f, "ASSEMBLY"),
            UnitType::QualityControl => write!(f, "QUALITY_CONTROL"),
            UnitType::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for UnitType {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase().replace('-', "_");
        if normalized.is_empty() {
            return Err("unit type is empty");
        }
        if normalized.contains(':') {
            return Err("unit type must not contain ':'");
        }

        Ok(match normalized.as_str() {
            "DISTRIBUTION" => UnitType::Distribution,
            "MACHINING" => UnitType::Machining,
            "ASSEMBLY" => UnitType::Assembly,
            "QUALITY_CONTROL" | "QC" => UnitType::QualityControl,
            _ => UnitType::Custom(normalized),
        })
    }
}

impl TryFrom<String> for UnitType {
    type Error = &'static str;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UnitType> for String {
    fn from(value: UnitType) -> Self {
        value.to_string()
    }
}

/// Static description of a production unit, as declared in the topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub id: String,
    pub unit_type: UnitType,
    pub site: String,
    /// Maximum queue length before the priority override applies
    pub capacity: u32,
    /// Processing time per task
    pub cycle_time_ms: u64,
    /// Energy consumption rating (0-200 scale)
    pub energy: f64,
    /// Peers this unit gossips with; empty means "every other unit"
    #[serde(default)]
    pub neighbors: Vec<String>,
}

impl UnitSpec {
    /// Load added per queued task, in percent
    pub fn load_increment(&self) -> f64 {
        if self.capacity == 0 {
            100.0
        } else {
            100.0 / self.capacity as f64
        }
    }

    /// Cycle time in seconds
    pub fn cycle_time_secs(&self) -> f64 {
        self.cycle_time_ms as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_type_parse_is_normalized() {
        assert_eq!(" assembly ".parse::<UnitType>(), Ok(UnitType::Assembly));
        assert_eq!(
            "quality-control".parse::<UnitType>(),
            Ok(UnitType::QualityControl)
        );
        assert_eq!(
            "painting".parse::<UnitType>(),
            Ok(UnitType::Custom("PAINTING".into()))
        );
        assert!("".parse::<UnitType>().is_err());
        assert!("a:b".parse::<UnitType>().is_err());
    }

    #[test]
    fn test_load_increment() {
        let spec = UnitSpec {
            id: "M1".into(),
            unit_type: UnitType::Distribution,
            site: "A".into(),
            capacity: 10,
            cycle_time_ms: 2000,
            energy: 50.0,
            neighbors: vec![],
        };
        assert_eq!(spec.load_increment(), 10.0);
        assert_eq!(spec.cycle_time_secs(), 2.0);
    }
}
