//! Fixed-delay retry policy
//!
//! Attempts are strictly sequential. A policy with `max_attempts == 1`
//! runs the operation once and escalates immediately on failure.
//!
//! # Example
//!
//! ```ignore
//! let policy = RetryPolicy::fixed(5, Duration::from_secs(3));
//! let result = policy
//!     .run_command("chart pull", || runner.run(&pull_spec))
//!     .await?;
//! ```

use crate::process::{CommandResult, ExecutionLaunchError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// How often, and how far apart, an operation is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (at least 1)
    pub max_attempts: u32,

    /// Pause between two attempts
    #[serde(with = "duration_secs", rename = "delay_secs")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Run once, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Up to `max_attempts` attempts with a fixed `delay` between them
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Retry a command until it exits successfully
    ///
    /// Non-zero exits, deadline expiries and launch errors all count as
    /// failed attempts. After the last attempt the final result (or launch
    /// error) is handed back unchanged; earlier failures are discarded on
    /// success.
    pub async fn run_command<F, Fut>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<CommandResult, ExecutionLaunchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CommandResult, ExecutionLaunchError>>,
    {
        let max_attempts = self.attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcome = operation().await;

            let failure = match &outcome {
                Ok(result) if result.success() => None,
                Ok(result) if result.deadline_exceeded => Some("deadline exceeded".to_string()),
                Ok(result) => Some(format!(
                    "exit code {}: {}",
                    result.code(),
                    result.stderr_trimmed()
                )),
                Err(e) => Some(e.to_string()),
            };
            let Some(failure) = failure else {
                return outcome;
            };

            if attempt >= max_attempts {
                if max_attempts > 1 {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %failure,
                        "Operation failed after max retries"
                    );
                }
                return outcome;
            }

            warn!(
                operation = %operation_name,
                attempt = attempt,
                max_attempts = max_attempts,
                error = %failure,
                delay_ms = self.delay.as_millis() as u64,
                "Operation failed, retrying"
            );
            tokio::time::sleep(self.delay).await;
        }
    }

    /// Retry any fallible operation until it returns `Ok`
    ///
    /// `should_retry` decides whether a given error is worth another attempt;
    /// errors it rejects are returned immediately.
    pub async fn execute<F, Fut, T, E, R>(
        &self,
        operation_name: &str,
        mut operation: F,
        should_retry: R,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        R: Fn(&E) -> bool,
    {
        let max_attempts = self.attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt >= max_attempts || !should_retry(&e) {
                        return Err(e);
                    }
                    warn!(
                        operation = %operation_name,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
