//! Exponential backoff with jitter.
//!
//! [`Retry`] wraps any async operation returning `Result<T, E>`. The
//! operation runs at most `max_retries + 1` times. When an attempt fails the
//! error is handed back unchanged if `should_retry` rejects it or attempts
//! are exhausted; otherwise the executor sleeps and tries again.
//!
//! Delay for the retry after failed attempt `n` (0-based):
//!
//! ```text
//! retry_delay(err, n)                          when it returns Some
//! min(max_delay, base_delay * 2^n) + U[0, jitter]  otherwise
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(8_000),
            jitter: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Policy with default delays and a custom retry budget.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Capped exponential part of the delay after failed attempt `attempt`.
    pub fn exponential(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Full backoff delay including random jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.exponential(attempt) + random_jitter(self.jitter)
    }
}

// ThreadRng is !Send; keep it out of any async frame.
fn random_jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

/// Reported to `on_retry` right before the executor sleeps.
#[derive(Debug)]
pub struct RetryAttempt<'e, E> {
    /// 1-based number of the retry about to run.
    pub attempt: u32,
    pub delay: Duration,
    pub error: &'e E,
}

type ShouldRetry<'a, E> = Box<dyn Fn(&E, u32) -> bool + Send + Sync + 'a>;
type RetryDelay<'a, E> = Box<dyn Fn(&E, u32) -> Option<Duration> + Send + Sync + 'a>;
type OnRetry<'a, E> = Box<dyn Fn(RetryAttempt<'_, E>) + Send + Sync + 'a>;

/// Configured retry executor. Holds no state between [`Retry::run`] calls.
pub struct Retry<'a, E> {
    policy: RetryPolicy,
    should_retry: ShouldRetry<'a, E>,
    retry_delay: Option<RetryDelay<'a, E>>,
    on_retry: Option<OnRetry<'a, E>>,
}

impl<'a, E> Retry<'a, E> {
    /// Retry every error according to `policy`.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            should_retry: Box::new(|_, _| true),
            retry_delay: None,
            on_retry: None,
        }
    }

    /// Decide per error and 0-based attempt whether another try is allowed.
    pub fn should_retry(mut self, f: impl Fn(&E, u32) -> bool + Send + Sync + 'a) -> Self {
        self.should_retry = Box::new(f);
        self
    }

    /// Override the computed backoff; `None` falls back to the policy.
    pub fn retry_delay(
        mut self,
        f: impl Fn(&E, u32) -> Option<Duration> + Send + Sync + 'a,
    ) -> Self {
        self.retry_delay = Some(Box::new(f));
        self
    }

    pub fn on_retry(mut self, f: impl Fn(RetryAttempt<'_, E>) + Send + Sync + 'a) -> Self {
        self.on_retry = Some(Box::new(f));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation`, passing the 0-based attempt index.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 0u32;
        loop {
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= self.policy.max_retries || !(self.should_retry)(&error, attempt) {
                return Err(error);
            }

            let delay = self
                .retry_delay
                .as_ref()
                .and_then(|f| f(&error, attempt))
                .unwrap_or_else(|| self.policy.backoff(attempt));

            if let Some(on_retry) = &self.on_retry {
                on_retry(RetryAttempt {
                    attempt: attempt + 1,
                    delay,
                    error: &error,
                });
            }
            drop(error);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
