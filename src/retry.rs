//! Bounded retry with exponential backoff.
//!
//! Backend calls fail transiently far more often than they fail for good.
//! [`RetryPolicy::run`] repeats an operation while its error reports itself
//! [`Retryable`], sleeping `base * 2^(attempt-1)` (capped, plus jitter)
//! between attempts, and gives up with [`RetryError::Exhausted`] after
//! `max_attempts`.  A non-retryable error returns at once as
//! [`RetryError::Fatal`].

use std::error::Error;
use std::fmt;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

/// Errors that know whether trying again could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first one.
    pub max_attempts: u32,
    pub base_delay:   Duration,
    pub max_delay:    Duration,
    /// Upper bound of the uniform jitter added to each delay.
    pub max_jitter:   Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay:   Duration::from_millis(500),
            max_delay:    Duration::from_secs(30),
            max_jitter:   Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay:  Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.backoff(attempt) + jitter
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, E, F>(&self, operation: &'static str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Retryable + fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => return Err(RetryError::Fatal(e)),
                Err(e) if attempt >= max_attempts => {
                    return Err(RetryError::Exhausted { operation, attempts: attempt, last: e });
                }
                Err(e) => {
                    let delay = self.delay(attempt);
                    warn!(operation, attempt, ?delay, error = %e, "retrying");
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Why [`RetryPolicy::run`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    Fatal(E),
    Exhausted { operation: &'static str, attempts: u32, last: E },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Fatal(e) => e.fmt(f),
            RetryError::Exhausted { operation, attempts, last } => {
                write!(f, "{operation} gave up after {attempts} attempts: {last}")
            }
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Fatal(e) | RetryError::Exhausted { last: e, .. } => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Flaky {
        Busy,
        Gone,
    }

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            matches!(self, Flaky::Busy)
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let out = RetryPolicy::immediate(5).run("fetch", |attempt| {
            calls += 1;
            if attempt < 3 { Err(Flaky::Busy) } else { Ok(attempt) }
        });
        assert_eq!(out.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[test]
    fn fatal_error_is_not_retried() {
        let mut calls = 0;
        let out: Result<(), _> = RetryPolicy::immediate(5).run("fetch", |_| {
            calls += 1;
            Err(Flaky::Gone)
        });
        assert!(matches!(out, Err(RetryError::Fatal(Flaky::Gone))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let out: Result<(), _> = RetryPolicy::immediate(4).run("fetch", |_| {
            calls += 1;
            Err(Flaky::Busy)
        });
        match out {
            Err(RetryError::Exhausted { operation, attempts, last }) => {
                assert_eq!((operation, attempts, last), ("fetch", 4, Flaky::Busy));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(calls, 4);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay:   Duration::from_millis(100),
            max_delay:    Duration::from_millis(500),
            max_jitter:   Duration::ZERO,
        };
        let delays: Vec<u128> = (1..=5).map(|a| policy.backoff(a).as_millis()).collect();
        assert_eq!(delays, [100, 200, 400, 500, 500]);
        assert_eq!(policy.backoff(200), Duration::from_millis(500));
    }
}
