use serde::{Deserialize, Serialize};

use crate::error::{PlantError, Result};

pub const ENERGY: &str = "ENERGY";
pub const TRANSPORT: &str = "TRANSPORT";
pub const PROCESSING: &str = "PROCESSING";

/// A named, globally shared resource with a fixed total.
///
/// `available` never exceeds `total` and never drops below zero: allocations
/// that would overdraw are rejected, releases are clamped at `total`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePool {
    name: String,
    total: u32,
    available: u32,
}

impl ResourcePool {
    pub fn new(name: impl Into<String>, total: u32) -> Self {
        Self {
            name: name.into(),
            total,
            available: total,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    /// Take `amount` out of the pool
    pub fn allocate(&mut self, amount: u32) -> Result<()> {
        if amount > self.available {
            return Err(PlantError::ResourceExhausted {
                resource: self.name.clone(),
                requested: amount,
                available: self.available,
            });
        }
        self.available -= amount;
        Ok(())
    }

    /// Return `amount` to the pool. Returns how much was actually credited.
    pub fn release(&mut self, amount: u32) -> u32 {
        let credited = amount.min(self.total - self.available);
        self.available += credited;
        credited
    }

    /// Fraction of the pool currently allocated (0.0-1.0)
    pub fn utilization(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.total - self.available) as f64 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_rejects_overdraw() {
        let mut pool = ResourcePool::new(PROCESSING, 500);
        assert!(pool.allocate(200).is_ok());
        assert_eq!(pool.available(), 300);

        let err = pool.allocate(301).unwrap_err();
        assert!(matches!(
            err,
            PlantError::ResourceExhausted {
                requested: 301,
                available: 300,
                ..
            }
        ));
        assert_eq!(pool.available(), 300);
    }

    #[test]
    fn test_release_is_clamped_at_total() {
        let mut pool = ResourcePool::new(TRANSPORT, 100);
        pool.allocate(30).unwrap();
        assert_eq!(pool.release(50), 30);
        assert_eq!(pool.available(), 100);
        assert_eq!(pool.release(10), 0);
        assert_eq!(pool.available(), pool.total());
    }

    #[test]
    fn test_utilization() {
        let mut pool = ResourcePool::new(ENERGY, 10_000);
        assert_eq!(pool.utilization(), 0.0);
        pool.allocate(9_500).unwrap();
        assert!((pool.utilization() - 0.95).abs() < 1e-9);
        assert_eq!(ResourcePool::new("EMPTY", 0).utilization(), 0.0);
    }
}
