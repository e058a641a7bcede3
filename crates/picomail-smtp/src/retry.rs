//! Bounded retry with a fixed back-off.
//!
//! Only transient failures ([`Error::is_transient`]) are retried. Anything
//! else is returned as soon as it happens.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Pluggable sleep used between attempts.
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Sleeper that blocks the calling thread.
#[must_use]
pub fn thread_sleeper() -> Sleeper {
    Arc::new(std::thread::sleep)
}

/// Retry budget for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total number of attempts this policy allows.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Runs `operation` until it succeeds, fails permanently, or the budget
    /// is spent.
    ///
    /// `operation` receives the 1-based attempt number. `sleep` is called
    /// with [`RetryPolicy::delay`] before every retry.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient error unchanged, or
    /// [`Error::RetryExhausted`] wrapping the last transient error.
    pub fn run<T, F>(&self, mut operation: F, sleep: &dyn Fn(Duration)) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match operation(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= max_attempts => {
                    return Err(Error::RetryExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts,
                        delay_secs = self.delay.as_secs_f32(),
                        error = %e,
                        "Transient failure, retrying"
                    );
                    sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }
}
