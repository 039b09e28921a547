//! Bounded retry for startup dependencies.
//!
//! The database usually comes up alongside the service, so the first few
//! connection attempts may fail. `retry` keeps trying for a fixed number of
//! attempts and then gives up with the last error, which aborts startup.

use anyhow::{anyhow, Result};
use std::{fmt::Display, future::Future, time::Duration};
use tokio::time::sleep;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Default policy: 10 attempts, 5s apart.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `op` until it succeeds or `policy.attempts` is exhausted.
///
/// # Errors
/// Returns the last error of `op`, annotated with `label` and the attempt count.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{label} ready after {attempt} attempts");
                }
                return Ok(value);
            }
            Err(err) if attempt < policy.attempts => {
                warn!(
                    attempt,
                    max_attempts = policy.attempts,
                    "{label} not ready: {err}"
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                return Err(anyhow!(
                    "{label} still unavailable after {attempt} attempts: {err}"
                ));
            }
        }
    }
}
