use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{ErrorKind, Result};

/// Default number of acquire attempts
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay before the second attempt
const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Default growth factor between consecutive delays
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// How often, and how patiently, to retry an acquire that found nothing.
///
/// Only misses are retried. Errors are returned right away since they
/// won't go away by waiting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first miss
    #[serde(default = "default_backoff", with = "humantime_serde")]
    pub backoff: Duration,

    /// Factor applied to the delay after every further miss
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Upper bound for any single delay
    #[serde(default, with = "humantime_serde")]
    pub max_backoff: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            multiplier: DEFAULT_MULTIPLIER,
            max_backoff: None,
        }
    }
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_backoff() -> Duration {
    DEFAULT_BACKOFF
}

const fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}

impl RetryPolicy {
    /// Create a policy with the given attempts and initial delay, keeping
    /// the default multiplier and no cap
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
            ..Self::default()
        }
    }

    /// Set the growth factor
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Cap every delay at `max_backoff`
    #[must_use]
    pub const fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = Some(max_backoff);
        self
    }

    /// Check that the policy can be used
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidRetryPolicy`] if there are no attempts,
    /// if the multiplier would shrink the delays or if the cap is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ErrorKind::InvalidRetryPolicy(
                "at least one attempt is required".into(),
            ));
        }
        if !(self.multiplier >= 1.0 && self.multiplier.is_finite()) {
            return Err(ErrorKind::InvalidRetryPolicy(format!(
                "multiplier must be a finite number of at least 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_backoff.is_some_and(|max| max.is_zero()) {
            return Err(ErrorKind::InvalidRetryPolicy(
                "maximum backoff must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Delays to wait between consecutive attempts.
    ///
    /// There is one delay less than there are attempts, since nobody waits
    /// after the last one.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + use<> {
        let multiplier = self.multiplier;
        let cap = self.max_backoff;
        let count = self.max_attempts.saturating_sub(1) as usize;

        std::iter::successors(Some(self.backoff), move |previous| {
            Some(
                Duration::try_from_secs_f64(previous.as_secs_f64() * multiplier)
                    .unwrap_or(Duration::MAX),
            )
        })
        .map(move |delay| cap.map_or(delay, |cap| delay.min(cap)))
        .take(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn millis(ms: &[u64]) -> Vec<Duration> {
        ms.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn test_default_policy_is_valid() {
        let policy = RetryPolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.delays().collect::<Vec<_>>(), millis(&[500, 1000]));
    }

    #[test]
    fn test_delays_grow_and_are_capped() {
        let policy = RetryPolicy::new(6, Duration::from_millis(100))
            .with_multiplier(3.0)
            .with_max_backoff(Duration::from_secs(1));
        assert_eq!(
            policy.delays().collect::<Vec<_>>(),
            millis(&[100, 300, 900, 1000, 1000])
        );
    }

    #[test]
    fn test_single_attempt_never_waits() {
        let policy = RetryPolicy::new(1, Duration::from_secs(1));
        assert_eq!(policy.delays().count(), 0);
    }

    #[test]
    fn test_huge_delays_saturate() {
        let policy = RetryPolicy::new(4, Duration::MAX).with_multiplier(10.0);
        assert!(policy.delays().all(|d| d == Duration::MAX));
    }

    #[rstest]
    #[case(RetryPolicy::new(0, Duration::from_millis(1)))]
    #[case(RetryPolicy::default().with_multiplier(0.5))]
    #[case(RetryPolicy::default().with_multiplier(f64::NAN))]
    #[case(RetryPolicy::default().with_max_backoff(Duration::ZERO))]
    fn test_invalid_policies(#[case] policy: RetryPolicy) {
        let err = policy.validate().unwrap_err();
        assert!(err.is_invalid_argument(), "{err}");
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: RetryPolicy = toml::from_str(
            r#"
            max_attempts = 5
            backoff = "250ms"
            max_backoff = "2s"
            "#,
        )
        .unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff, Duration::from_millis(250));
        assert_eq!(policy.max_backoff, Some(Duration::from_secs(2)));
        assert!((policy.multiplier - 2.0).abs() < f64::EPSILON);
    }
}
