//! Bounded retry with exponential backoff.
//!
//! Network-facing stages take a [`RetryPolicy`] instead of hardcoding their
//! retry behaviour, so the policy can be configured and tested on its own.

use std::future::Future;
use std::time::Duration;

use engine_logging::{engine_info, engine_warn};
use rand::Rng;

/// Classifies an error as transient (worth another attempt) or permanent.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Adds up to 100% of the delay at random.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self::immediate(1)
    }

    /// Retries without sleeping. Used by tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based), before jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        if self.jitter && !delay.is_zero() {
            add_jitter(delay)
        } else {
            delay
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up. The last error is returned.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    engine_info!("{} succeeded after {} attempts", label, attempt);
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                engine_warn!(
                    "{} failed (attempt {}/{}), retrying in {} ms: {}",
                    label,
                    attempt,
                    max_attempts,
                    delay.as_millis(),
                    err
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
