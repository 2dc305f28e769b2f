use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::ResourcePool;
use crate::error::{PlantError, Result};

/// Every shared pool, owned by the supervisor task
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceLedger {
    pools: BTreeMap<String, ResourcePool>,
}

impl ResourceLedger {
    pub fn new(totals: &BTreeMap<String, u32>) -> Self {
        let pools = totals
            .iter()
            .map(|(name, total)| (name.to_ascii_uppercase(), ResourcePool::new(name.to_ascii_uppercase(), *total)))
            .collect();
        Self { pools }
    }

    pub fn get(&self, resource: &str) -> Option<&ResourcePool> {
        self.pools.get(&resource.to_ascii_uppercase())
    }

    pub fn allocate(&mut self, resource: &str, amount: u32) -> Result<()> {
        self.pools
            .get_mut(&resource.to_ascii_uppercase())
            .ok_or_else(|| PlantError::UnknownResource(resource.to_string()))?
            .allocate(amount)
    }

    /// Returns the amount actually credited
    pub fn release(&mut self, resource: &str, amount: u32) -> Result<u32> {
        let pool = self
            .pools
            .get_mut(&resource.to_ascii_uppercase())
            .ok_or_else(|| PlantError::UnknownResource(resource.to_string()))?;
        Ok(pool.release(amount))
    }

    /// Pools at or above `level` utilisation
    pub fn strained(&self, level: f64) -> Vec<&ResourcePool> {
        self.pools
            .values()
            .filter(|p| p.utilization() >= level)
            .collect()
    }

    pub fn pools(&self) -> impl Iterator<Item = &ResourcePool> {
        self.pools.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::SupervisorConfig;

    #[test]
    fn test_default_pools() {
        let ledger = ResourceLedger::new(&SupervisorConfig::default().pools);
        assert_eq!(ledger.get("energy").map(|p| p.total()), Some(10_000));
        assert_eq!(ledger.get("TRANSPORT").map(|p| p.total()), Some(100));
        assert_eq!(ledger.get("PROCESSING").map(|p| p.available()), Some(500));
    }

    #[test]
    fn test_unknown_pool() {
        let mut ledger = ResourceLedger::new(&SupervisorConfig::default().pools);
        assert!(matches!(
            ledger.allocate("WATER", 1),
            Err(PlantError::UnknownResource(_))
        ));
        assert!(ledger.release("WATER", 1).is_err());
    }

    #[test]
    fn test_strained_pools() {
        let mut ledger = ResourceLedger::new(&SupervisorConfig::default().pools);
        ledger.allocate("TRANSPORT", 95).unwrap();
        let strained: Vec<&str> = ledger.strained(0.9).iter().map(|p| p.name()).collect();
        assert_eq!(strained, vec!["TRANSPORT"]);
        assert_eq!(ledger.release("TRANSPORT", 200).unwrap(), 95);
    }
}
