//! Cycle pacing jitter behind an injectable seam

use rand::Rng;
use std::time::Duration;

/// Supplies the extra delay added between trading cycles. Randomized in
/// production so concurrent agents do not herd onto the same tick; fixed
/// implementations keep tests deterministic.
pub trait DelayProvider: Send + Sync {
    fn jitter(&self) -> Duration;
}

/// Uniform random jitter in `[0, max_ms)`
pub struct RandomJitter {
    max_ms: u64,
}

impl RandomJitter {
    pub fn new(max_ms: u64) -> Self {
        Self { max_ms }
    }
}

impl DelayProvider for RandomJitter {
    fn jitter(&self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(0..self.max_ms);
        Duration::from_millis(ms)
    }
}

/// Constant jitter, used in tests and when randomization is disabled
pub struct FixedJitter {
    delay: Duration,
}

impl FixedJitter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl DelayProvider for FixedJitter {
    fn jitter(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_jitter_within_bound() {
        let provider = RandomJitter::new(250);
        for _ in 0..100 {
            assert!(provider.jitter() < Duration::from_millis(250));
        }
    }

    #[test]
    fn test_zero_bound_yields_no_jitter() {
        let provider = RandomJitter::new(0);
        assert_eq!(provider.jitter(), Duration::ZERO);
    }

    #[test]
    fn test_fixed_jitter_is_deterministic() {
        let provider = FixedJitter::new(Duration::from_millis(40));
        assert_eq!(provider.jitter(), Duration::from_millis(40));
        assert_eq!(provider.jitter(), Duration::from_millis(40));
    }
}
