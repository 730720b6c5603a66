//! Pacing and retry backoff policies
//!
//! Delay computations are pure given a jitter sample, so they can be tested
//! without sleeping.

use std::time::Duration;

use crate::infrastructure::config::{PacingConfig, RetryConfig};

/// Randomized pause inserted between two fetch attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    min_delay: Duration,
    max_delay: Duration,
}

impl PacingPolicy {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay: min_delay.min(max_delay),
            max_delay: max_delay.max(min_delay),
        }
    }

    /// No pacing at all; for tests and local fixtures
    pub const fn none() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &PacingConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Uniform sample in `[min_delay, max_delay]`
    pub fn next_delay(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(fastrand::u64(min..=max))
    }
}

/// Retry budgets and backoff curves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub blocked_budget: u32,
    pub failed_budget: u32,
    pub blocked_base: Duration,
    pub blocked_max: Duration,
    pub failed_step: Duration,
    pub failed_max: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            blocked_budget: config.blocked_budget.max(1),
            failed_budget: config.failed_budget.max(1),
            blocked_base: Duration::from_millis(config.blocked_base_delay_ms),
            blocked_max: Duration::from_millis(config.blocked_max_delay_ms),
            failed_step: Duration::from_millis(config.failed_step_ms),
            failed_max: Duration::from_millis(config.failed_max_delay_ms),
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    /// Same budgets, no waiting
    pub const fn immediate(blocked_budget: u32, failed_budget: u32) -> Self {
        Self {
            blocked_budget,
            failed_budget,
            blocked_base: Duration::ZERO,
            blocked_max: Duration::ZERO,
            failed_step: Duration::ZERO,
            failed_max: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Exponential backoff after the `consecutive`-th blocked attempt.
    ///
    /// `base * 2^(n-1)` capped at the maximum, plus `jitter`. A larger
    /// server `Retry-After` wins but is capped as well.
    pub fn blocked_delay(
        &self,
        consecutive: u32,
        retry_after: Option<Duration>,
        jitter: Duration,
    ) -> Duration {
        let exponent = consecutive.saturating_sub(1).min(31);
        let exponential = self
            .blocked_base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.blocked_max)
            .min(self.blocked_max);
        let delay = exponential.saturating_add(jitter);

        match retry_after {
            Some(server) => delay.max(server.min(self.blocked_max)),
            None => delay,
        }
    }

    /// Linear backoff after the `consecutive`-th failed attempt
    pub fn failed_delay(&self, consecutive: u32) -> Duration {
        self.failed_step
            .checked_mul(consecutive)
            .unwrap_or(self.failed_max)
            .min(self.failed_max)
    }

    /// Uniform jitter sample in `[0, jitter]`
    pub fn sample_jitter(&self) -> Duration {
        Duration::from_millis(fastrand::u64(0..=self.jitter.as_millis() as u64))
    }

    /// Most attempts one page can take: both budgets are spent separately
    pub fn attempts_per_page(&self) -> u32 {
        (self.blocked_budget + self.failed_budget).saturating_sub(1).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig::default())
    }

    #[rstest]
    #[case(1, 10)]
    #[case(2, 20)]
    #[case(3, 40)]
    #[case(4, 60)]
    #[case(30, 60)]
    fn blocked_delay_doubles_until_capped(#[case] n: u32, #[case] secs: u64) {
        assert_eq!(
            policy().blocked_delay(n, None, Duration::ZERO),
            Duration::from_secs(secs)
        );
    }

    #[test]
    fn blocked_delay_adds_jitter() {
        assert_eq!(
            policy().blocked_delay(1, None, Duration::from_millis(1_500)),
            Duration::from_millis(11_500)
        );
    }

    #[test]
    fn larger_retry_after_wins_but_is_capped() {
        let p = policy();
        assert_eq!(
            p.blocked_delay(1, Some(Duration::from_secs(45)), Duration::ZERO),
            Duration::from_secs(45)
        );
        assert_eq!(
            p.blocked_delay(1, Some(Duration::from_secs(3_600)), Duration::ZERO),
            Duration::from_secs(60)
        );
        assert_eq!(
            p.blocked_delay(2, Some(Duration::from_secs(1)), Duration::ZERO),
            Duration::from_secs(20)
        );
    }

    #[rstest]
    #[case(1, 5)]
    #[case(2, 10)]
    #[case(6, 30)]
    #[case(100, 30)]
    fn failed_delay_is_linear_and_capped(#[case] n: u32, #[case] secs: u64) {
        assert_eq!(policy().failed_delay(n), Duration::from_secs(secs));
    }

    #[test]
    fn pacing_stays_within_bounds() {
        let pacing = PacingPolicy::new(Duration::from_millis(20), Duration::from_millis(50));
        for _ in 0..200 {
            let delay = pacing.next_delay();
            assert!(delay >= Duration::from_millis(20) && delay <= Duration::from_millis(50));
        }
    }

    #[test]
    fn pacing_none_never_waits() {
        assert_eq!(PacingPolicy::none().next_delay(), Duration::ZERO);
    }

    #[test]
    fn jitter_sample_within_bound() {
        let p = policy();
        for _ in 0..100 {
            assert!(p.sample_jitter() <= p.jitter);
        }
    }
}
