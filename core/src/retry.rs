//! Retry with exponential backoff and jitter
//!
//! `RetryPolicy` is an immutable value: build it once, share it across
//! callers, and pass per-call details (operation label, which failures to
//! retry, an optional hook) through [`RetryOptions`].
//!
//! ```text
//! delay(attempt) = min(base_delay * multiplier^attempt, max_delay)
//! with jitter:     delay(attempt) * uniform(0.5, 1.5)
//! ```

use crate::{
    classifier::{Classify, KindSet},
    errors::ConfigError,
    telemetry,
};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

const JITTER_MIN: f64 = 0.5;
const JITTER_MAX: f64 = 1.5;

/// Backoff configuration shared by blocking and async retries
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(10_000),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a validated policy
    ///
    /// `max_attempts` includes the initial try.
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter: bool,
    ) -> Result<Self, ConfigError> {
        if max_attempts < 1 {
            return Err(ConfigError::below_minimum("max_attempts", 1, max_attempts));
        }
        if max_delay < base_delay {
            return Err(ConfigError::Ordering {
                lower: "base_delay",
                upper: "max_delay",
            });
        }
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(ConfigError::below_minimum("multiplier", 1.0, multiplier));
        }

        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
            multiplier,
            jitter,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Delay to wait after the failed attempt with 0-based index `attempt`
    ///
    /// Deterministic without jitter; with jitter each call draws a fresh
    /// factor. Truncated to whole milliseconds.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let capped_ms = self.backoff_ms(attempt);
        let delay_ms = if self.jitter {
            capped_ms * rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX)
        } else {
            capped_ms
        };

        Duration::from_millis(delay_ms as u64)
    }

    fn backoff_ms(&self, attempt: u32) -> f64 {
        let base_ms = self.base_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        if base_ms == 0.0 {
            return 0.0;
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        (base_ms * self.multiplier.powi(exponent)).min(max_ms)
    }

    /// Run a blocking operation, sleeping the thread between attempts
    ///
    /// Failures whose kind is outside `options.retry_on` are returned at
    /// once. After the last attempt the last failure is returned as is.
    ///
    /// # Example
    ///
    /// ```rust
    /// use reliability_machines::{Classify, FailureKind, RetryOptions, RetryPolicy};
    /// use std::time::Duration;
    ///
    /// #[derive(Debug)]
    /// struct Flaky;
    ///
    /// impl std::fmt::Display for Flaky {
    ///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    ///         f.write_str("flaky")
    ///     }
    /// }
    ///
    /// impl Classify for Flaky {
    ///     fn failure_kind(&self) -> FailureKind {
    ///         FailureKind::Timeout
    ///     }
    /// }
    ///
    /// let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5), 2.0, false)?;
    /// let mut calls = 0;
    /// let result = policy.execute(RetryOptions::new("lookup"), || {
    ///     calls += 1;
    ///     if calls < 2 { Err(Flaky) } else { Ok(calls) }
    /// });
    /// assert_eq!(result.unwrap(), 2);
    /// # Ok::<(), reliability_machines::ConfigError>(())
    /// ```
    pub fn execute<T, E, F>(&self, mut options: RetryOptions<'_, E>, mut operation: F) -> Result<T, E>
    where
        E: Classify + Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(value) => {
                    self.log_recovery(&options, attempt);
                    return Ok(value);
                }
                Err(e) => {
                    let delay = self.on_failure(&mut options, attempt, &e).ok_or(e)?;
                    std::thread::sleep(delay);
                }
            }
            attempt += 1;
        }
    }

    /// Run an async operation, suspending on `tokio::time::sleep` between attempts
    ///
    /// Same semantics as [`RetryPolicy::execute`]. The operation is a closure
    /// producing a fresh future per attempt.
    pub async fn execute_async<T, E, F, Fut>(
        &self,
        mut options: RetryOptions<'_, E>,
        mut operation: F,
    ) -> Result<T, E>
    where
        E: Classify + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    self.log_recovery(&options, attempt);
                    return Ok(value);
                }
                Err(e) => {
                    let delay = self.on_failure(&mut options, attempt, &e).ok_or(e)?;
                    tokio::time::sleep(delay).await;
                }
            }
            attempt += 1;
        }
    }

    fn log_recovery<E>(&self, options: &RetryOptions<'_, E>, attempt: u32) {
        if attempt > 0 {
            info!(
                operation = %options.operation,
                attempt = attempt + 1,
                "retry succeeded"
            );
        }
    }

    /// Bookkeeping for a failed attempt; `Some(delay)` means try again
    fn on_failure<E: Classify + Display>(
        &self,
        options: &mut RetryOptions<'_, E>,
        attempt: u32,
        e: &E,
    ) -> Option<Duration> {
        if !options.retry_on.matches(e) {
            return None;
        }

        let attempt_number = attempt + 1;
        telemetry::record_retry_attempt(&options.operation, attempt_number);

        if attempt_number >= self.max_attempts {
            error!(
                operation = %options.operation,
                attempts = self.max_attempts,
                kind = %e.failure_kind(),
                error = %e,
                "all retry attempts failed"
            );
            return None;
        }

        let delay = self.calculate_delay(attempt);
        warn!(
            operation = %options.operation,
            attempt = attempt_number,
            max_attempts = self.max_attempts,
            kind = %e.failure_kind(),
            error = %e,
            delay_ms = delay.as_millis() as u64,
            "retrying after failure"
        );
        if let Some(on_retry) = options.on_retry.as_mut() {
            on_retry(attempt_number, e);
        }
        Some(delay)
    }
}

type RetryHook<'a, E> = Box<dyn FnMut(u32, &E) + Send + 'a>;

/// Per-call retry settings
pub struct RetryOptions<'a, E> {
    operation: String,
    retry_on: KindSet,
    on_retry: Option<RetryHook<'a, E>>,
}

impl<'a, E> RetryOptions<'a, E> {
    /// Options for the named operation, retrying every failure kind
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            retry_on: KindSet::ALL,
            on_retry: None,
        }
    }

    /// Only retry failures of these kinds
    pub fn retry_on(mut self, kinds: KindSet) -> Self {
        self.retry_on = kinds;
        self
    }

    /// Called with the 1-based attempt number and the error before each wait
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: FnMut(u32, &E) + Send + 'a,
    {
        self.on_retry = Some(Box::new(f));
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl<E> Default for RetryOptions<'_, E> {
    fn default() -> Self {
        Self::new("operation")
    }
}

impl<E> std::fmt::Debug for RetryOptions<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("operation", &self.operation)
            .field("retry_on", &self.retry_on)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FailureKind;
    use std::collections::HashSet;
    use std::time::Instant;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient(u32),
        Fatal,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient(n) => write!(f, "transient failure #{n}"),
                TestError::Fatal => f.write_str("fatal failure"),
            }
        }
    }

    impl Classify for TestError {
        fn failure_kind(&self) -> FailureKind {
            match self {
                TestError::Transient(_) => FailureKind::Connection,
                TestError::Fatal => FailureKind::Client,
            }
        }
    }

    fn policy(max_attempts: u32, base_ms: u64, max_ms: u64, jitter: bool) -> RetryPolicy {
        RetryPolicy::new(
            max_attempts,
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            2.0,
            jitter,
        )
        .expect("valid policy")
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay(), Duration::from_millis(100));
        assert_eq!(policy.max_delay(), Duration::from_millis(10_000));
        assert_eq!(policy.multiplier(), 2.0);
        assert!(policy.jitter());
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let ms = Duration::from_millis;

        assert!(RetryPolicy::new(0, ms(100), ms(1000), 2.0, false).is_err());
        assert_eq!(
            RetryPolicy::new(3, ms(1000), ms(100), 2.0, false),
            Err(ConfigError::Ordering {
                lower: "base_delay",
                upper: "max_delay"
            })
        );
        assert!(RetryPolicy::new(3, ms(100), ms(1000), 0.5, false).is_err());
        assert!(RetryPolicy::new(3, ms(100), ms(1000), f64::NAN, false).is_err());
        assert!(RetryPolicy::new(1, Duration::ZERO, Duration::ZERO, 1.0, false).is_ok());
    }

    #[test]
    fn test_calculate_delay_exponential_backoff() {
        let policy = policy(5, 100, 10_000, false);

        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn test_calculate_delay_with_max_cap() {
        let policy = policy(10, 100, 500, false);

        assert_eq!(policy.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(10), Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_calculate_delay_matches_formula_without_jitter() {
        let policy = RetryPolicy::new(
            10,
            Duration::from_millis(30),
            Duration::from_millis(20_000),
            1.5,
            false,
        )
        .expect("valid policy");

        for attempt in 0..20 {
            let expected = (30.0 * 1.5f64.powi(attempt as i32)).min(20_000.0) as u64;
            assert_eq!(policy.calculate_delay(attempt), Duration::from_millis(expected));
        }
    }

    #[test]
    fn test_zero_base_delay_never_waits() {
        let policy = policy(3, 0, 1000, true);

        for attempt in 0..5 {
            assert_eq!(policy.calculate_delay(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn test_calculate_delay_with_jitter() {
        let policy = policy(5, 1000, 10_000, true);
        let mut values = HashSet::new();

        for _ in 0..50 {
            let delay = policy.calculate_delay(1);
            assert!(delay >= Duration::from_millis(1000), "{delay:?} below 0.5x");
            assert!(delay <= Duration::from_millis(3000), "{delay:?} above 1.5x");
            values.insert(delay);
        }

        assert!(values.len() > 1, "jitter should produce variance");
    }

    #[test]
    fn test_success_first_attempt() {
        let policy = policy(3, 10, 100, false);
        let mut calls = 0;

        let result = policy.execute(RetryOptions::new("first"), || {
            calls += 1;
            Ok::<_, TestError>("done")
        });

        assert_eq!(result, Ok("done"));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_success_after_failures_waits_between_attempts() {
        let policy = policy(3, 10, 1000, false);
        let mut calls = 0u32;
        let mut started = Vec::new();

        let begin = Instant::now();
        let result = policy.execute(RetryOptions::new("flaky"), || {
            started.push(begin.elapsed());
            calls += 1;
            if calls < 3 {
                Err(TestError::Transient(calls))
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
        assert!(started[1] - started[0] >= Duration::from_millis(10));
        assert!(started[2] - started[1] >= Duration::from_millis(20));
    }

    #[test]
    fn test_exhausts_attempts_and_returns_last_error() {
        let policy = policy(3, 1, 10, false);
        let mut calls = 0u32;

        let result: Result<(), _> = policy.execute(RetryOptions::new("always"), || {
            calls += 1;
            Err(TestError::Transient(calls))
        });

        assert_eq!(result, Err(TestError::Transient(3)));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_non_retryable_failure_propagates_immediately() {
        let policy = policy(5, 1000, 10_000, false);
        let mut calls = 0;
        let mut hooks = 0;

        let begin = Instant::now();
        let result: Result<(), _> = policy.execute(
            RetryOptions::new("fatal")
                .retry_on(KindSet::of(&[FailureKind::Connection]))
                .on_retry(|_, _| hooks += 1),
            || {
                calls += 1;
                Err(TestError::Fatal)
            },
        );

        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls, 1);
        assert_eq!(hooks, 0);
        assert!(begin.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_single_attempt_means_no_retry() {
        let policy = policy(1, 1000, 1000, false);
        let mut calls = 0;

        let result: Result<(), _> = policy.execute(RetryOptions::new("once"), || {
            calls += 1;
            Err(TestError::Transient(1))
        });

        assert_eq!(result, Err(TestError::Transient(1)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_on_retry_receives_attempt_numbers() {
        let policy = policy(4, 1, 10, false);
        let mut seen = Vec::new();

        let result: Result<(), _> = policy.execute(
            RetryOptions::new("hooked").on_retry(|attempt, e: &TestError| {
                seen.push((attempt, e.to_string()))
            }),
            || Err(TestError::Transient(7)),
        );

        assert!(result.is_err());
        assert_eq!(
            seen,
            vec![
                (1, "transient failure #7".to_string()),
                (2, "transient failure #7".to_string()),
                (3, "transient failure #7".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_success_after_failures() {
        let policy = policy(3, 10, 1000, false);
        let mut calls = 0u32;

        let begin = tokio::time::Instant::now();
        let result = policy
            .execute_async(RetryOptions::new("async_flaky"), || {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Err(TestError::Transient(n))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls, 3);
        assert_eq!(begin.elapsed(), Duration::from_millis(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_exhaustion_and_non_retryable() {
        let policy = policy(3, 10, 1000, false);

        let mut calls = 0u32;
        let result: Result<(), _> = policy
            .execute_async(RetryOptions::new("async_always"), || {
                calls += 1;
                let n = calls;
                async move { Err(TestError::Transient(n)) }
            })
            .await;
        assert_eq!(result, Err(TestError::Transient(3)));
        assert_eq!(calls, 3);

        let begin = tokio::time::Instant::now();
        let mut calls = 0u32;
        let result: Result<(), _> = policy
            .execute_async(
                RetryOptions::new("async_fatal").retry_on(KindSet::TRANSIENT),
                || {
                    calls += 1;
                    async { Err(TestError::Fatal) }
                },
            )
            .await;
        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls, 1);
        assert_eq!(begin.elapsed(), Duration::ZERO);
    }
}
