//! Exponential backoff for synchronous operations.

use std::{fmt::Debug, thread, time::Duration};
use tracing::{debug, warn};

/// Default delay before the second attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(100);
/// Default upper bound for a single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Why [`Retrier::run_if`] gave up.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    /// The operation failed with an error the predicate refused to retry.
    #[error(transparent)]
    Permanent(E),
}

impl<E> RetryError<E> {
    /// The last error returned by the operation.
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Permanent(err) => err,
        }
    }
}

/// Retry policy: `initial * multiplier^n` between attempts, capped at `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrier {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Total attempts including the first. `0` is treated as `1`.
    pub max_attempts: u32,
}

impl Default for Retrier {
    fn default() -> Self {
        Self {
            initial: DEFAULT_INITIAL_DELAY,
            max: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl Retrier {
    pub fn new(initial: Duration, max: Duration, multiplier: f64, max_attempts: u32) -> Self {
        Self {
            initial,
            max,
            multiplier,
            max_attempts,
        }
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Call `op` until it succeeds or every attempt is used.
    pub fn run<T, E, F>(&self, op: F) -> Result<T, RetryError<E>>
    where
        E: Debug,
        F: FnMut() -> Result<T, E>,
    {
        self.run_if(op, |_| true)
    }

    /// Like [`run`](Self::run), but only errors for which `retryable` returns `true`
    /// are retried. Others are returned at once as [`RetryError::Permanent`].
    pub fn run_if<T, E, F, P>(&self, mut op: F, retryable: P) -> Result<T, RetryError<E>>
    where
        E: Debug,
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !retryable(&err) {
                return Err(RetryError::Permanent(err));
            }
            if attempt >= max_attempts {
                warn!(attempts = attempt, error = ?err, "Retries exhausted");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.delay(attempt);
            debug!(attempt, ?delay, error = ?err, "Attempt failed, retrying");
            thread::sleep(delay);
        }
    }
}
