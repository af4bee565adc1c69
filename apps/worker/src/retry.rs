//! Retry decisions for failed attempts
//!
//! Pure computation: given how many attempts already failed, decide whether
//! the job gets another one and how long it waits first.

use std::time::Duration;

use rand::Rng;

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound on any retry delay
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// Longest server-requested wait honored before a retry
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// Symmetric jitter applied when enabled (±20%)
const JITTER_RATIO: f64 = 0.2;

/// Whether a failure may be retried at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Retryable,
    Fatal,
}

/// Outcome of [`RetryPolicy::decide`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeue after the delay
    Retry(Duration),
    /// Give up
    Terminal,
}

/// Exponential backoff with an upper bound and optional jitter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl RetryPolicy {
    /// Policy without jitter; `max_delay` is raised to `base_delay` if lower
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay: max_delay.max(base_delay),
            jitter: false,
        }
    }

    /// Enable or disable ±20% jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// `base_delay * 2^attempt_count`, capped at `max_delay`, before jitter
    pub fn backoff(&self, attempt_count: u32) -> Duration {
        2u32.checked_pow(attempt_count)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// The larger of `backoff` and a `Retry-After` style hint, with the hint
    /// capped at [`MAX_RETRY_AFTER`]
    pub fn with_hint(&self, backoff: Duration, hint: Option<Duration>) -> Duration {
        hint.map_or(backoff, |hint| backoff.max(hint.min(MAX_RETRY_AFTER)))
    }

    /// Decide what happens after a failed attempt
    ///
    /// `attempt_count` is the number of earlier failures that were already
    /// retried, so with `max_retries = 3` the delays are 1s, 2s, 4s and the
    /// fourth failure is terminal.
    pub fn decide(&self, attempt_count: u32, max_retries: u32, kind: FailureKind) -> RetryDecision {
        if kind == FailureKind::Fatal || attempt_count >= max_retries {
            return RetryDecision::Terminal;
        }

        let delay = self.backoff(attempt_count);
        if !self.jitter {
            return RetryDecision::Retry(delay);
        }

        let factor = rand::thread_rng().gen_range((1.0 - JITTER_RATIO)..=(1.0 + JITTER_RATIO));
        RetryDecision::Retry(delay.mul_f64(factor).min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, Duration::from_secs(1))]
    #[case(1, Duration::from_secs(2))]
    #[case(2, Duration::from_secs(4))]
    #[case(8, Duration::from_secs(256))]
    #[case(9, DEFAULT_MAX_DELAY)]
    #[case(64, DEFAULT_MAX_DELAY)]
    fn test_backoff_doubles_until_cap(#[case] attempt: u32, #[case] expected: Duration) {
        assert_eq!(RetryPolicy::default().backoff(attempt), expected);
    }

    #[test]
    fn test_canonical_sequence_then_terminal() {
        let policy = RetryPolicy::default();
        let decisions: Vec<RetryDecision> = (0..=3)
            .map(|attempt| policy.decide(attempt, 3, FailureKind::Retryable))
            .collect();

        assert_eq!(
            decisions,
            vec![
                RetryDecision::Retry(Duration::from_secs(1)),
                RetryDecision::Retry(Duration::from_secs(2)),
                RetryDecision::Retry(Duration::from_secs(4)),
                RetryDecision::Terminal,
            ]
        );
    }

    #[test]
    fn test_fatal_is_terminal_with_budget_left() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(0, 10, FailureKind::Fatal), RetryDecision::Terminal);
    }

    #[test]
    fn test_zero_retries_is_terminal() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(0, 0, FailureKind::Retryable),
            RetryDecision::Terminal
        );
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy::new(Duration::from_secs(10), Duration::from_secs(60))
            .with_jitter(true);

        for attempt in 0..6 {
            let nominal = policy.backoff(attempt);
            for _ in 0..200 {
                let RetryDecision::Retry(delay) =
                    policy.decide(attempt, 10, FailureKind::Retryable)
                else {
                    panic!("expected a retry");
                };
                assert!(delay <= policy.max_delay());
                assert!(delay >= nominal.mul_f64(0.8) - Duration::from_millis(1));
                assert!(delay <= nominal.mul_f64(1.2) + Duration::from_millis(1));
            }
        }
    }

    #[rstest]
    #[case(None, Duration::from_secs(4))]
    #[case(Some(Duration::from_secs(1)), Duration::from_secs(4))]
    #[case(Some(Duration::from_secs(30)), Duration::from_secs(30))]
    #[case(Some(Duration::from_secs(u64::MAX)), MAX_RETRY_AFTER)]
    fn test_hint_extends_backoff_up_to_cap(
        #[case] hint: Option<Duration>,
        #[case] expected: Duration,
    ) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.with_hint(Duration::from_secs(4), hint), expected);
    }

    #[test]
    fn test_max_delay_never_below_base() {
        let policy = RetryPolicy::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(policy.max_delay(), Duration::from_secs(5));
        assert_eq!(policy.backoff(3), Duration::from_secs(5));
    }
}
