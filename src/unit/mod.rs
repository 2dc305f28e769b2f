//! Tier 1: autonomous production units

pub mod admission;
pub mod agent;
pub mod config;
pub mod policy;

pub use admission::{evaluate_admission, proposal_score, Admission, AdmissionInput};
pub use agent::{UnitAgent, UnitSnapshot};
pub use config::UnitConfig;
pub use policy::{FailurePolicy, FixedPolicy, ProbabilisticPolicy};
