//! Retryable job execution for storage-bound background work
//!
//! Transient storage errors (database busy/locked) back off exponentially
//! and re-run the whole job; anything else is a permanent failure. Either
//! way the caller only sees whether the job eventually succeeded.

use crate::config::StatisticsConfig;
use crate::error::StatisticsError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, retries: u32) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    /// Delay before the next attempt, `None` once retries are used up
    pub fn next_delay(&self) -> Option<Duration> {
        if self.current_attempt >= self.max_retries {
            return None;
        }

        let factor = 2_u32.saturating_pow(self.current_attempt);
        Some(std::cmp::min(
            self.initial_delay.saturating_mul(factor),
            self.max_delay,
        ))
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        let delay = self.next_delay().ok_or(MaxRetriesExceeded)?;

        log::warn!(
            "⏳ Retry attempt {} of {} in {:?}",
            self.current_attempt + 1,
            self.max_retries,
            delay
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }
}

#[derive(Debug, Clone)]
pub struct RetryRunner {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
}

impl RetryRunner {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_retries,
        }
    }

    pub fn from_config(config: &StatisticsConfig) -> Self {
        Self::new(
            Duration::from_millis(config.retry_initial_ms),
            Duration::from_millis(config.retry_max_delay_ms),
            config.retry_max,
        )
    }

    /// Run `job` until it succeeds, fails permanently, or exhausts retries
    ///
    /// Returns the job's own success flag, or `false` on failure.
    pub async fn run_with_retry<F, Fut>(&self, job_name: &str, mut job: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, StatisticsError>>,
    {
        let mut backoff = ExponentialBackoff::new(self.initial_delay, self.max_delay, self.max_retries);

        loop {
            match job().await {
                Ok(done) => {
                    if backoff.attempts() > 0 {
                        log::info!("✅ Job '{}' succeeded after {} retries", job_name, backoff.attempts());
                    }
                    return done;
                }
                Err(e) if e.is_transient() => {
                    log::warn!("⚠️  Job '{}' hit transient error: {}", job_name, e);
                    if backoff.sleep().await.is_err() {
                        log::error!(
                            "❌ Job '{}' failed after {} retries: {}",
                            job_name,
                            self.max_retries,
                            e
                        );
                        return false;
                    }
                }
                Err(e) => {
                    log::error!("❌ Job '{}' failed permanently: {}", job_name, e);
                    return false;
                }
            }
        }
    }
}
