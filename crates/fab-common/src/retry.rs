//! ---
//! fab_section: "07-resilience-fault-tolerance"
//! fab_subsection: "module"
//! fab_type: "source"
//! fab_scope: "code"
//! fab_description: "Bounded exponential backoff for transient failures."
//! fab_version: "v0.0.0-prealpha"
//! fab_owner: "tbd"
//! ---
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Policy parameters controlling retry attempts and scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first call included. Never below one.
    pub max_attempts: usize,
    /// Delay applied before the second attempt (exponential backoff).
    pub base_delay: Duration,
    /// Maximum jitter added to each delay.
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Policy with at least one attempt.
    pub fn new(max_attempts: usize, base_delay: Duration, jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter,
        }
    }

    /// A policy that performs exactly one attempt.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before the attempt following `attempt` (1-indexed), growing exponentially.
    pub fn backoff_delay(&self, attempt: usize, rng: &mut StdRng) -> Duration {
        let exponent = (attempt.saturating_sub(1) as u32).min(8);
        let base = self.base_delay.mul_f64(2u32.pow(exponent) as f64);
        if self.jitter.is_zero() {
            base
        } else {
            let jitter_ms = rng.gen_range(0..=self.jitter.as_millis().max(1)) as u64;
            base + Duration::from_millis(jitter_ms)
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay, config.jitter)
    }
}

/// Drives an async operation under a [`RetryPolicy`].
///
/// Only failures classified as transient by the caller are retried; every other
/// error is returned from the first attempt that produced it.
#[derive(Debug)]
pub struct Retrier {
    policy: RetryPolicy,
    rng: Mutex<StdRng>,
}

impl Retrier {
    /// Retrier with a fixed default seed.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            rng: Mutex::new(StdRng::seed_from_u64(0xFAB_5EED)),
        }
    }

    /// Seed the jitter RNG for deterministic testing.
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            policy: self.policy,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Policy in use.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `operation`, retrying while `is_transient` holds for the error and
    /// attempts remain. The closure receives the 1-indexed attempt number.
    pub async fn run<T, E, F, Fut, C>(
        &self,
        label: &str,
        mut operation: F,
        is_transient: C,
    ) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = label, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if is_transient(&err) && attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff_delay(attempt, &mut self.rng.lock());
                    warn!(
                        operation = label,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure; retrying",
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        warn!(
                            operation = label,
                            attempts = attempt,
                            error = %err,
                            "giving up after retries",
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
