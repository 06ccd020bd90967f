//! Reusable retry/backoff combinator.
//!
//! A plain struct of knobs with a `Default` and named constructors, plus a
//! combinator that drives an async fallible operation through the policy,
//! so every retrying call site (optimistic commits, transient storage
//! errors) shares one backoff implementation instead of hand-rolling loops.

use std::time::Duration;

/// Backoff policy for optimistic commit retries and transient storage
/// errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Full-jitter factor in `[0, 1]`; `0.0` disables jitter.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter_factor: 0.5,
        }
    }
}

impl RetryPolicy {
    /// No retries at all — useful in tests that want to observe the first
    /// failure directly.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Delay before the `attempt`-th retry (0-indexed), before jitter.
    fn raw_delay(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }

    /// Delay before the `attempt`-th retry, with full jitter applied
    /// deterministically from a caller-supplied `[0, 1)` random sample —
    /// kept as a pure function so it can be unit-tested without relying on
    /// a global RNG.
    pub fn jittered_delay(&self, attempt: u32, sample: f64) -> Duration {
        let raw = self.raw_delay(attempt);
        if self.jitter_factor <= 0.0 {
            return raw;
        }
        let floor = raw.as_secs_f64() * (1.0 - self.jitter_factor);
        let span = raw.as_secs_f64() * self.jitter_factor;
        Duration::from_secs_f64((floor + span * sample).max(0.0))
    }
}

/// Classifies whether an error is worth retrying. Default: retryable for
/// optimistic-commit conflicts and transient storage errors, not retryable
/// for anything that indicates a real invariant violation.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Drive `op` through `policy`, retrying while `op`'s error is retryable and
/// attempts remain. `sleep` is injected so the combinator stays runtime
/// agnostic (callers pass `tokio::time::sleep`, or a no-op in tests).
pub async fn with_retry<T, E, F, Fut, S, SFut>(
    policy: &RetryPolicy,
    mut op: F,
    mut sleep: S,
) -> Result<T, E>
where
    E: Retryable,
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    S: FnMut(Duration) -> SFut,
    SFut: std::future::Future<Output = ()>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && err.is_retryable() => {
                let delay = policy.jittered_delay(attempt, 0.5);
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..Default::default()
        };
        assert_eq!(policy.raw_delay(0), Duration::from_millis(100));
        assert_eq!(policy.raw_delay(1), Duration::from_millis(200));
        assert_eq!(policy.raw_delay(2), Duration::from_millis(400));
        // base(100ms) * 2^20 would blow past max_delay (10s); must clamp.
        assert_eq!(policy.raw_delay(20), policy.max_delay);
    }

    #[test]
    fn jitter_stays_within_band() {
        let policy = RetryPolicy::default();
        let low = policy.jittered_delay(2, 0.0);
        let high = policy.jittered_delay(2, 1.0);
        let raw = policy.raw_delay(2);
        assert!(low.as_secs_f64() >= raw.as_secs_f64() * 0.5 - 1e-9);
        assert!(high.as_secs_f64() <= raw.as_secs_f64() + 1e-9);
    }

    #[derive(Debug)]
    struct Flaky(bool);
    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            base_delay: Duration::from_millis(1),
            ..Default::default()
        };
        let mut calls = 0;
        let result: Result<i32, Flaky> = with_retry(
            &policy,
            |attempt| {
                calls += 1;
                async move {
                    if attempt < 2 {
                        Err(Flaky(true))
                    } else {
                        Ok(42)
                    }
                }
            },
            |_| async {},
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_fast() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let result: Result<i32, Flaky> = with_retry(
            &policy,
            |_| {
                calls += 1;
                async { Err(Flaky(false)) }
            },
            |_| async {},
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
