//! Task admission and call-for-proposal scoring. Pure functions.

use serde::Serialize;

use crate::domain::RefusalReason;

/// The part of a unit's state admission depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdmissionInput {
    pub operational: bool,
    pub load: f64,
    pub queue_len: u32,
    pub capacity: u32,
    pub priority: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Admission {
    Accept,
    Refuse(RefusalReason),
}

/// Decide whether a unit takes a task.
///
/// Checks run in order: operational, load above `high_water_load`, then a full
/// queue, which still admits tasks with priority above `override_priority`.
pub fn evaluate_admission(input: &AdmissionInput, high_water_load: f64, override_priority: u8) -> Admission {
    if !input.operational {
        return Admission::Refuse(RefusalReason::NotOperational);
    }
    if input.load > high_water_load {
        return Admission::Refuse(RefusalReason::LoadHigh);
    }
    if input.queue_len >= input.capacity && input.priority <= override_priority {
        return Admission::Refuse(RefusalReason::QueueFull);
    }
    Admission::Accept
}

/// Proposal score in 0..=1: 50% availability, 30% spare queue, 20% energy efficiency
pub fn proposal_score(load: f64, queue_len: u32, capacity: u32, energy: f64) -> f64 {
    let availability = (100.0 - load) / 100.0;
    let spare_ratio = if capacity == 0 {
        0.0
    } else {
        (capacity as f64 - queue_len as f64) / capacity as f64
    };
    let energy_efficiency = 1.0 - energy / 200.0;
    0.5 * availability + 0.3 * spare_ratio + 0.2 * energy_efficiency
}
