//! Bounded and unbounded retry with fixed backoff.

use std::future::Future;
use std::time::Duration;

use nodebox_core::config::Timings;
use nodebox_core::error::Result;

/// Wallet unlock attempts after an lnd (re)start.
pub const UNLOCK_ATTEMPTS: u32 = 10;

/// Chain download attempts per resync.
pub const DOWNLOAD_ATTEMPTS: u32 = 10;

/// Password change attempts while lnd boots.
pub const PASSWORD_CHANGE_ATTEMPTS: u32 = 20;

/// Hidden-service hostname polls after tor starts.
pub const HIDDEN_SERVICE_ATTEMPTS: u32 = 10;

/// Fixed-backoff retry policy. `max_attempts == None` retries forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: Option<u32>,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn bounded(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff,
        }
    }

    pub const fn unbounded(backoff: Duration) -> Self {
        Self {
            max_attempts: None,
            backoff,
        }
    }

    /// Boot sequence: never gives up.
    pub fn boot(timings: &Timings) -> Self {
        Self::unbounded(timings.boot_backoff())
    }

    pub fn unlock(timings: &Timings) -> Self {
        Self::bounded(UNLOCK_ATTEMPTS, timings.unlock_backoff())
    }

    /// Download retries back off inside the attached run, not here.
    pub fn download() -> Self {
        Self::bounded(DOWNLOAD_ATTEMPTS, Duration::ZERO)
    }

    pub fn password_change(timings: &Timings) -> Self {
        Self::bounded(PASSWORD_CHANGE_ATTEMPTS, timings.password_retry())
    }

    pub fn hidden_service(timings: &Timings) -> Self {
        Self::bounded(HIDDEN_SERVICE_ATTEMPTS, timings.hidden_service_poll())
    }

    /// Whether 1-based `attempt` may run.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Run `op` until it succeeds, the policy is exhausted, or an error is not
    /// retryable. Returns the last error.
    pub async fn run_while<T, F, Fut>(
        &self,
        label: &str,
        retryable: impl Fn(&nodebox_core::NodeError) -> bool,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if !retryable(&e) || !self.allows(attempt + 1) {
                        if retryable(&e) {
                            tracing::warn!(
                                operation = label,
                                attempts = attempt,
                                error = %e,
                                "Retries exhausted"
                            );
                        }
                        return Err(e);
                    }
                    tracing::warn!(
                        operation = label,
                        attempt,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// [`Self::run_while`] retrying every error.
    pub async fn run<T, F, Fut>(&self, label: &str, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_while(label, |_| true, op).await
    }
}
