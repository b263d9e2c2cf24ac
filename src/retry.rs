//! Bounded retry with a fixed delay between attempts.
//!
//! The parallel engine wraps every chunk in a [`RetryPolicy`]: thread-pool
//! workers use [`RetryPolicy::run_blocking`], async reduce tasks use
//! [`RetryPolicy::run`], which sleeps without holding a runtime thread.

use std::time::Duration;
use tracing::warn;

/// A retry loop stopped by its caller before the operation succeeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("retry loop abandoned after {attempts} attempts")]
pub struct Abandoned {
    pub attempts: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    retries: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Run `op` until it succeeds or the retries run out, sleeping the calling
    /// thread between attempts. `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// The error of the last attempt.
    pub fn run_blocking<R, F>(&self, label: &str, op: F) -> anyhow::Result<R>
    where
        F: FnMut(u32) -> anyhow::Result<R>,
    {
        self.run_blocking_while(label, || true, op)
    }

    /// [`run_blocking`](Self::run_blocking) that checks `keep_going` before
    /// every attempt, including the first, and gives up with [`Abandoned`]
    /// once it returns `false`.
    ///
    /// # Errors
    ///
    /// [`Abandoned`] if `keep_going` turned false, otherwise the error of the
    /// last attempt.
    pub fn run_blocking_while<R, K, F>(&self, label: &str, keep_going: K, mut op: F) -> anyhow::Result<R>
    where
        K: Fn() -> bool,
        F: FnMut(u32) -> anyhow::Result<R>,
    {
        let mut remaining = self.retries;
        let mut attempt = 1;
        loop {
            if !keep_going() {
                return Err(Abandoned { attempts: attempt - 1 }.into());
            }
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(e) if remaining > 0 => {
                    remaining -= 1;
                    warn!(%label, attempt, remaining, error = %e, "operation failed, retrying");
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Async flavour of [`run_blocking`](Self::run_blocking); waits with
    /// `tokio::time::sleep`.
    ///
    /// # Errors
    ///
    /// The error of the last attempt.
    pub async fn run<R, F, Fut>(&self, label: &str, mut op: F) -> anyhow::Result<R>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = anyhow::Result<R>>,
    {
        let mut remaining = self.retries;
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if remaining > 0 => {
                    remaining -= 1;
                    warn!(%label, attempt, remaining, error = %e, "operation failed, retrying");
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
