use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of self-detected failures and repairs, injected so runs can be
/// seeded or scripted.
pub trait FailurePolicy: Send + Sync {
    /// Draw for an operational unit: true means it fails now
    fn should_fail(&mut self) -> bool;

    /// Draw for a failed unit: true means it repairs itself now
    fn should_recover(&mut self) -> bool;
}

/// Bernoulli draws from a seedable RNG
pub struct ProbabilisticPolicy {
    rng: StdRng,
    failure_probability: f64,
    recovery_probability: f64,
}

impl ProbabilisticPolicy {
    pub fn new(failure_probability: f64, recovery_probability: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            failure_probability: failure_probability.clamp(0.0, 1.0),
            recovery_probability: recovery_probability.clamp(0.0, 1.0),
        }
    }
}

impl FailurePolicy for ProbabilisticPolicy {
    fn should_fail(&mut self) -> bool {
        self.rng.gen_bool(self.failure_probability)
    }

    fn should_recover(&mut self) -> bool {
        self.rng.gen_bool(self.recovery_probability)
    }
}

/// Always answers the same way
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPolicy {
    pub fail: bool,
    pub recover: bool,
}

impl FixedPolicy {
    /// Never fails, never needs to recover
    pub fn reliable() -> Self {
        Self {
            fail: false,
            recover: false,
        }
    }

    pub fn always_fail() -> Self {
        Self {
            fail: true,
            recover: false,
        }
    }
}

impl FailurePolicy for FixedPolicy {
    fn should_fail(&mut self) -> bool {
        self.fail
    }

    fn should_recover(&mut self) -> bool {
        self.recover
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_policies_agree() {
        let mut a = ProbabilisticPolicy::new(0.3, 0.5, Some(7));
        let mut b = ProbabilisticPolicy::new(0.3, 0.5, Some(7));
        let draws_a: Vec<bool> = (0..64).map(|_| a.should_fail()).collect();
        let draws_b: Vec<bool> = (0..64).map(|_| b.should_fail()).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn test_probabilities_are_clamped() {
        let mut never = ProbabilisticPolicy::new(-1.0, 2.0, Some(1));
        assert!((0..32).all(|_| !never.should_fail()));
        assert!((0..32).all(|_| never.should_recover()));
    }

    #[test]
    fn test_fixed_policy() {
        let mut p = FixedPolicy::always_fail();
        assert!(p.should_fail());
        assert!(!p.should_recover());
        assert!(!FixedPolicy::reliable().should_fail());
    }
}
