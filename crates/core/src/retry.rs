//! Exponential backoff with jitter for rescheduled jobs.
//!
//! The delay anchor doubles with each attempt (`base * 2^(attempt-1)`),
//! is capped at `max`, and is then spread by `jitter_ratio` in both
//! directions so retries against the inference backend do not line up.

use std::time::Duration;

use rand::Rng;

/// Default base delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(60);

/// Default upper bound on any single retry delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(600);

/// Default fraction of the anchor delay used as jitter span.
pub const DEFAULT_JITTER_RATIO: f64 = 0.25;

/// Backoff parameters for job retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: i32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::job::DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay for the given attempt number (1-based).
    pub fn anchor_delay(&self, attempt: i32) -> Duration {
        let exp = attempt.saturating_sub(1).clamp(0, 30);
        let scaled = self.base_delay.as_secs_f64() * 2f64.powi(exp);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// Delay for `attempt` with jitter drawn from the thread-local RNG.
    pub fn delay_for_attempt(&self, attempt: i32) -> Duration {
        let unit: f64 = rand::rng().random_range(0.0..=1.0);
        self.jittered_delay(attempt, unit)
    }

    /// Delay for `attempt` given a jitter sample in `[0, 1]`.
    ///
    /// `0.0` maps to the lower edge of the jitter window, `1.0` to the upper
    /// edge. The result never exceeds `max_delay`.
    pub fn jittered_delay(&self, attempt: i32, unit: f64) -> Duration {
        let anchor = self.anchor_delay(attempt).as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let span = (anchor * self.jitter_ratio.max(0.0)).min(max);

        let lower = (anchor - span).max(0.0);
        let upper = (anchor + span).min(max);
        let unit = unit.clamp(0.0, 1.0);

        Duration::from_secs_f64(lower + (upper - lower) * unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(600),
            jitter_ratio: 0.25,
        }
    }

    #[test]
    fn anchor_doubles_per_attempt() {
        let p = policy();
        assert_eq!(p.anchor_delay(1), Duration::from_secs(60));
        assert_eq!(p.anchor_delay(2), Duration::from_secs(120));
        assert_eq!(p.anchor_delay(3), Duration::from_secs(240));
    }

    #[test]
    fn anchor_is_capped() {
        assert_eq!(policy().anchor_delay(10), Duration::from_secs(600));
    }

    #[test]
    fn jitter_window_edges() {
        let p = policy();
        assert_eq!(p.jittered_delay(1, 0.0), Duration::from_secs(45));
        assert_eq!(p.jittered_delay(1, 1.0), Duration::from_secs(75));
        assert_eq!(p.jittered_delay(1, 0.5), Duration::from_secs(60));
    }

    #[test]
    fn jitter_never_exceeds_max() {
        let p = policy();
        assert_eq!(p.jittered_delay(8, 1.0), Duration::from_secs(600));
        for attempt in 1..8 {
            assert!(p.delay_for_attempt(attempt) <= p.max_delay);
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let p = RetryPolicy {
            jitter_ratio: 0.0,
            ..policy()
        };
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(120));
    }
}
