//! Unit directory kept by a site coordinator
//!
//! Entries only change in response to events pushed by the units themselves.
//! Last write wins; there is no versioning.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{SiteStatus, UnitType};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitEntry {
    pub unit_type: UnitType,
    pub capacity: u32,
    pub operational: bool,
    pub load: f64,
    pub queue_len: u32,
    pub completed: u64,
    /// Mailbox the unit listens on
    pub address: String,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnitDirectory {
    entries: BTreeMap<String, UnitEntry>,
}

impl UnitDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, unit: &str) -> Option<&UnitEntry> {
        self.entries.get(unit)
    }

    /// Insert or replace. Returns true when the unit was not known before.
    pub fn upsert(
        &mut self,
        unit: &str,
        unit_type: UnitType,
        capacity: u32,
        operational: bool,
    ) -> bool {
        let entry = UnitEntry {
            unit_type,
            capacity,
            operational,
            load: 0.0,
            queue_len: 0,
            completed: 0,
            address: unit.to_string(),
            last_update: Utc::now(),
        };
        match self.entries.get_mut(unit) {
            Some(existing) => {
                // keep accumulated history across re-registration
                let completed = existing.completed;
                *existing = UnitEntry {
                    completed,
                    load: existing.load,
                    queue_len: existing.queue_len,
                    ..entry
                };
                false
            }
            None => {
                self.entries.insert(unit.to_string(), entry);
                true
            }
        }
    }

    /// Returns false for unknown units
    pub fn set_operational(&mut self, unit: &str, operational: bool) -> bool {
        match self.entries.get_mut(unit) {
            Some(entry) => {
                entry.operational = operational;
                entry.last_update = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn update_status(&mut self, unit: &str, load: f64, queue_len: u32, operational: bool) -> bool {
        match self.entries.get_mut(unit) {
            Some(entry) => {
                entry.load = load.clamp(0.0, 100.0);
                entry.queue_len = queue_len;
                entry.operational = operational;
                entry.last_update = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn update_load(&mut self, unit: &str, load: f64, queue_len: Option<u32>) -> bool {
        match self.entries.get_mut(unit) {
            Some(entry) => {
                entry.load = load.clamp(0.0, 100.0);
                if let Some(queue_len) = queue_len {
                    entry.queue_len = queue_len;
                }
                entry.last_update = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn record_completion(&mut self, unit: &str) -> bool {
        match self.entries.get_mut(unit) {
            Some(entry) => {
                entry.completed += 1;
                entry.last_update = Utc::now();
                true
            }
            None => false,
        }
    }

    /// An operational unit of the same type, other than `unit`, below `max_load`.
    /// Least loaded first; ties go to the lexicographically first id.
    pub fn replacement_for(&self, unit: &str, max_load: f64) -> Option<&str> {
        let unit_type = &self.entries.get(unit)?.unit_type;
        self.entries
            .iter()
            .filter(|(id, e)| {
                id.as_str() != unit && e.operational && &e.unit_type == unit_type && e.load < max_load
            })
            .fold(None, |best: Option<(&String, &UnitEntry)>, (id, e)| match best {
                Some((_, b)) if b.load <= e.load => best,
                _ => Some((id, e)),
            })
            .map(|(id, _)| id.as_str())
    }

    /// Least-loaded operational unit, optionally excluding one
    pub fn least_loaded(&self, exclude: Option<&str>) -> Option<(&str, &UnitEntry)> {
        self.entries
            .iter()
            .filter(|(id, e)| e.operational && Some(id.as_str()) != exclude)
            .fold(None, |best: Option<(&String, &UnitEntry)>, (id, e)| match best {
                Some((_, b)) if b.load <= e.load => best,
                _ => Some((id, e)),
            })
            .map(|(id, e)| (id.as_str(), e))
    }

    /// Mean load over every entry, failed units included
    pub fn load_average(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        self.entries.values().map(|e| e.load).sum::<f64>() / self.entries.len() as f64
    }

    pub fn operational_count(&self) -> u32 {
        self.entries.values().filter(|e| e.operational).count() as u32
    }

    /// Operational units above `over` and below `under`
    pub fn load_extremes(&self, over: f64, under: f64) -> (Vec<&str>, Vec<&str>) {
        let mut overloaded = Vec::new();
        let mut underloaded = Vec::new();
        for (id, e) in self.entries.iter().filter(|(_, e)| e.operational) {
            if e.load > over {
                overloaded.push(id.as_str());
            } else if e.load < under {
                underloaded.push(id.as_str());
            }
        }
        (overloaded, underloaded)
    }

    pub fn status(&self, site_id: &str, failures: u32, completed_tasks: u64) -> SiteStatus {
        SiteStatus {
            site_id: site_id.to_string(),
            load_average: self.load_average(),
            total_units: self.entries.len() as u32,
            operational_units: self.operational_count(),
            failures,
            completed_tasks,
        }
    }
}
