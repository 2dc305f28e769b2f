//! Site registry and performance scoring

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::SiteStatus;

/// Score given to a site that registered but has not reported yet
pub const INITIAL_SCORE: u8 = 100;

/// Performance score (0-100) from a status report alone.
///
/// `round(0.4 * load + 0.4 * uptime + 0.2 * failure)` where the load term
/// peaks at 60% utilisation, uptime is the operational share of units
/// (0 for a site with no units) and each failure costs 20 points.
pub fn performance_score(status: &SiteStatus) -> u8 {
    let load_score = 100.0 - (status.load_average - 60.0).abs();
    let uptime_score = if status.total_units == 0 {
        0.0
    } else {
        100.0 * status.operational_units as f64 / status.total_units as f64
    };
    let failure_score = (100.0 - 20.0 * status.failures as f64).max(0.0);

    let score = 0.4 * load_score + 0.4 * uptime_score + 0.2 * failure_score;
    score.round().clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteRecord {
    pub site_id: String,
    /// Latest report, if any arrived yet
    pub status: Option<SiteStatus>,
    pub score: u8,
    pub registered_at: DateTime<Utc>,
    pub last_report: Option<DateTime<Utc>>,
}

impl SiteRecord {
    /// Sites that never reported count as idle with no units
    pub fn load(&self) -> f64 {
        self.status.as_ref().map_or(0.0, |s| s.load_average)
    }

    pub fn operational_units(&self) -> u32 {
        self.status.as_ref().map_or(0, |s| s.operational_units)
    }

    pub fn total_units(&self) -> u32 {
        self.status.as_ref().map_or(0, |s| s.total_units)
    }
}

/// Sites ordered by id, so every scan breaks ties lexicographically
#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteRegistry {
    sites: BTreeMap<String, SiteRecord>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a site at the initial score
    pub fn register(&mut self, site_id: &str) {
        self.sites.insert(
            site_id.to_string(),
            SiteRecord {
                site_id: site_id.to_string(),
                status: None,
                score: INITIAL_SCORE,
                registered_at: Utc::now(),
                last_report: None,
            },
        );
    }

    /// Store a report and recompute the score. Unknown sites are registered.
    pub fn ingest(&mut self, status: SiteStatus) -> u8 {
        let score = performance_score(&status);
        let now = Utc::now();
        let record = self
            .sites
            .entry(status.site_id.clone())
            .or_insert_with(|| SiteRecord {
                site_id: status.site_id.clone(),
                status: None,
                score: INITIAL_SCORE,
                registered_at: now,
                last_report: None,
            });
        record.score = score;
        record.status = Some(status);
        record.last_report = Some(now);
        score
    }

    pub fn get(&self, site_id: &str) -> Option<&SiteRecord> {
        self.sites.get(site_id)
    }

    pub fn score(&self, site_id: &str) -> Option<u8> {
        self.sites.get(site_id).map(|r| r.score)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn site_ids(&self) -> Vec<String> {
        self.sites.keys().cloned().collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &SiteRecord> {
        self.sites.values()
    }

    /// Other sites below `max_load` with at least one operational unit
    pub fn candidates(&self, exclude: &str, max_load: f64) -> Vec<&SiteRecord> {
        self.sites
            .values()
            .filter(|r| r.site_id != exclude && r.load() < max_load && r.operational_units() > 0)
            .collect()
    }

    /// Highest-scoring candidate; ties go to the first site id
    pub fn best_candidate(&self, exclude: &str, max_load: f64) -> Option<&SiteRecord> {
        self.candidates(exclude, max_load)
            .into_iter()
            .fold(None, |best: Option<&SiteRecord>, r| match best {
                Some(b) if b.score >= r.score => Some(b),
                _ => Some(r),
            })
    }

    /// First other site (by id) below `max_load`
    pub fn first_donor(&self, exclude: &str, max_load: f64) -> Option<&SiteRecord> {
        self.sites
            .values()
            .find(|r| r.site_id != exclude && r.load() < max_load)
    }

    /// `Σ load·units / Σ units` over reporting sites; None when no units
    pub fn weighted_load(&self) -> Option<f64> {
        let (weighted, units) = self
            .sites
            .values()
            .filter_map(|r| r.status.as_ref())
            .fold((0.0, 0u32), |(w, u), s| {
                (w + s.load_average * s.total_units as f64, u + s.total_units)
            });
        if units == 0 {
            None
        } else {
            Some(weighted / units as f64)
        }
    }

    /// (most loaded, least loaded) among sites that have reported
    pub fn load_extremes(&self) -> Option<(&SiteRecord, &SiteRecord)> {
        let mut reported = self.sites.values().filter(|r| r.status.is_some());
        let first = reported.next()?;
        let (max, min) = reported.fold((first, first), |(max, min), r| {
            let max = if r.load() > max.load() { r } else { max };
            let min = if r.load() < min.load() { r } else { min };
            (max, min)
        });
        Some((max, min))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(site: &str, load: f64, total: u32, operational: u32, failures: u32) -> SiteStatus {
        SiteStatus {
            site_id: site.into(),
            load_average: load,
            total_units: total,
            operational_units: operational,
            failures,
            completed_tasks: 0,
        }
    }

    #[test]
    fn test_performance_score() {
        // perfect site: load 60, all up, no failures
        assert_eq!(performance_score(&status("A", 60.0, 2, 2, 0)), 100);
        // 0.4*70 + 0.4*50 + 0.2*60 = 60
        assert_eq!(performance_score(&status("A", 90.0, 2, 1, 2)), 60);
        // no units: uptime is zero
        assert_eq!(performance_score(&status("A", 60.0, 0, 0, 0)), 60);
        // failures floor at zero
        assert_eq!(performance_score(&status("A", 60.0, 1, 1, 9)), 80);
    }

    #[test]
    fn test_score_rounds_rather_than_truncates() {
        // 0.4*99.5 + 0.4*100 + 0.2*100 = 99.8
        assert_eq!(performance_score(&status("A", 60.5, 1, 1, 0)), 100);
    }

    #[test]
    fn test_ingest_is_idempotent_and_registers_unknown_sites() {
        let mut registry = SiteRegistry::new();
        let first = registry.ingest(status("B", 40.0, 2, 2, 1));
        let second = registry.ingest(status("B", 40.0, 2, 2, 1));
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.score("B"), Some(first));
    }

    #[test]
    fn test_register_resets_score() {
        let mut registry = SiteRegistry::new();
        registry.ingest(status("A", 95.0, 2, 0, 5));
        registry.register("A");
        assert_eq!(registry.score("A"), Some(INITIAL_SCORE));
    }

    #[test]
    fn test_best_candidate_breaks_ties_by_site_id() {
        let mut registry = SiteRegistry::new();
        registry.ingest(status("A", 90.0, 2, 2, 0));
        registry.ingest(status("C", 60.0, 2, 2, 0));
        registry.ingest(status("B", 60.0, 2, 2, 0));
        registry.ingest(status("D", 10.0, 2, 0, 0));

        let best = registry.best_candidate("A", 70.0).unwrap();
        assert_eq!(best.site_id, "B");
        // D has no operational units
        assert_eq!(registry.candidates("A", 70.0).len(), 2);
    }

    #[test]
    fn test_weighted_load() {
        let mut registry = SiteRegistry::new();
        assert_eq!(registry.weighted_load(), None);
        registry.register("Z");
        assert_eq!(registry.weighted_load(), None);

        registry.ingest(status("A", 90.0, 3, 3, 0));
        registry.ingest(status("B", 50.0, 1, 1, 0));
        assert_eq!(registry.weighted_load(), Some(80.0));

        let (max, min) = registry.load_extremes().unwrap();
        assert_eq!(max.site_id, "A");
        assert_eq!(min.site_id, "B");
    }
}
