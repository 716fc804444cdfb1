//! Retry pacing: exponential backoff with a cap, plus jitter.
//!
//! Attempt semantics: attempt `1` is the initial dispatch and carries no
//! delay; retries start at attempt `2`. The delay doubles per retry and
//! saturates at the configured cap. Computations that would overflow
//! saturate to [`MAX_BACKOFF`].

use rand::{rng, Rng};
use std::time::Duration;

/// Hard ceiling applied when backoff arithmetic overflows (1 hour).
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Exponential retry schedule: `base * 2^(attempt - 2)`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    base: Duration,
    max: Duration,
}

impl RetrySchedule {
    /// Build a schedule. `max` is clamped up to `base` so the cap can never
    /// undercut the first retry delay.
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max: max.max(base) }
    }

    /// Delay to apply before the given dispatch attempt (1-based).
    ///
    /// Attempt 1 is the initial call and returns zero; attempt 2 returns
    /// `base`, attempt 3 `2 * base`, and so on up to the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = attempt - 2;
        let multiplier = 2u128.saturating_pow(exponent);
        let nanos = self.base.as_nanos().saturating_mul(multiplier);
        let raw = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
        raw.min(self.max).min(MAX_BACKOFF)
    }
}

/// Jitter strategy randomizing retry delays to spread synchronized retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Use the exact scheduled delay.
    None,
    /// Uniform in `[0, delay]`.
    #[default]
    Full,
    /// Uniform in `[delay / 2, delay]`, keeping a floor.
    Equal,
}

impl Jitter {
    /// Randomize a delay using the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rng())
    }

    /// Randomize a delay with an injected RNG (deterministic tests).
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Duration::ZERO;
        }
        match self {
            Jitter::None => delay,
            Jitter::Full => Duration::from_millis(rng.random_range(0..=millis)),
            Jitter::Equal => Duration::from_millis(rng.random_range(millis / 2..=millis)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn initial_attempt_is_free() {
        let schedule = RetrySchedule::new(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(schedule.delay(0), Duration::ZERO);
        assert_eq!(schedule.delay(1), Duration::ZERO);
    }

    #[test]
    fn delay_doubles_per_retry() {
        let schedule = RetrySchedule::new(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(schedule.delay(2), Duration::from_millis(100));
        assert_eq!(schedule.delay(3), Duration::from_millis(200));
        assert_eq!(schedule.delay(4), Duration::from_millis(400));
        assert_eq!(schedule.delay(5), Duration::from_millis(800));
    }

    #[test]
    fn delay_caps_at_max() {
        let schedule = RetrySchedule::new(Duration::from_millis(100), Duration::from_millis(300));
        assert_eq!(schedule.delay(3), Duration::from_millis(200));
        assert_eq!(schedule.delay(4), Duration::from_millis(300));
        assert_eq!(schedule.delay(20), Duration::from_millis(300));
    }

    #[test]
    fn overflow_saturates() {
        let schedule = RetrySchedule::new(Duration::from_secs(1), Duration::MAX);
        assert_eq!(schedule.delay(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn cap_never_undercuts_base() {
        let schedule = RetrySchedule::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(schedule.delay(2), Duration::from_secs(5));
    }

    #[test]
    fn no_jitter_is_identity() {
        let delay = Duration::from_millis(500);
        assert_eq!(Jitter::None.apply(delay), delay);
    }

    #[test]
    fn full_jitter_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let delay = Duration::from_millis(1000);
        for _ in 0..100 {
            let jittered = Jitter::Full.apply_with_rng(delay, &mut rng);
            assert!(jittered <= delay);
        }
    }

    #[test]
    fn equal_jitter_keeps_floor() {
        let mut rng = StdRng::seed_from_u64(7);
        let delay = Duration::from_millis(1000);
        for _ in 0..100 {
            let jittered = Jitter::Equal.apply_with_rng(delay, &mut rng);
            assert!(jittered >= Duration::from_millis(500));
            assert!(jittered <= delay);
        }
    }

    #[test]
    fn zero_delay_passes_through() {
        assert_eq!(Jitter::Full.apply(Duration::ZERO), Duration::ZERO);
    }
}
