use std::fmt::Display;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::{PeerError, Result};

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Sleep between two consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Effective number of attempts.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number. There is no sleep after the
    /// last attempt. Exhaustion yields [`PeerError::RetriesExhausted`].
    pub fn run<T, E, F>(&self, op: F) -> Result<T>
    where
        E: Display,
        F: FnMut(u32) -> std::result::Result<T, E>,
    {
        self.run_with_sleep(op, std::thread::sleep)
    }

    fn run_with_sleep<T, E, F, S>(&self, mut op: F, mut sleep: S) -> Result<T>
    where
        E: Display,
        F: FnMut(u32) -> std::result::Result<T, E>,
        S: FnMut(Duration),
    {
        let max = self.attempts();
        let mut last_error = String::new();

        for attempt in 1..=max {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    warn!(attempt, max_attempts = max, error = %err, "attempt failed");
                    last_error = err.to_string();
                    if attempt < max {
                        sleep(self.delay);
                    }
                }
            }
        }

        error!(attempts = max, error = %last_error, "all attempts failed");
        Err(PeerError::RetriesExhausted {
            attempts: max,
            last_error,
        })
    }
}
