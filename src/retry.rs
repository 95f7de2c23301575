//! Bounded exponential-backoff retry for transient provider faults.
//!
//! Only [`FailureKind::TransientServerError`] is retried. Every call to
//! [`RetryPolicy::run`] owns a fresh [`RetryState`], so concurrent or
//! consecutive sequences never share counters or timers.

use crate::config::RetryConfig;
use crate::error::{FailureKind, ProviderFailure};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Non-blocking wait between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.initial_delay)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after attempt `attempt` (1-based): `initial_delay * 2^(attempt - 1)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }

    /// Invokes `producer` until it succeeds, fails with a non-transient
    /// classification, or the attempt budget is spent.
    pub async fn run<T, F, Fut>(
        &self,
        sleeper: &dyn Sleeper,
        mut producer: F,
    ) -> Result<Retried<T>, ProviderFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderFailure>>,
    {
        let mut state = RetryState::new(*self);

        loop {
            let attempt = state.begin_attempt();
            match producer().await {
                Ok(value) => {
                    return Ok(Retried {
                        value,
                        attempts: attempt,
                    })
                }
                Err(failure) if failure.kind == FailureKind::TransientServerError => {
                    let Some(delay) = state.next_delay() else {
                        log::error!(
                            "Transient failure persisted after {} attempt(s): {}",
                            attempt,
                            failure.message
                        );
                        return Err(failure.with_attempts(attempt));
                    };
                    log::warn!(
                        "Attempt {}/{} hit a transient server error, retrying in {}ms",
                        attempt,
                        self.max_attempts,
                        delay.as_millis()
                    );
                    sleeper.sleep(delay).await;
                }
                Err(failure) => {
                    log::debug!(
                        "Attempt {}/{} failed with non-retryable {}",
                        attempt,
                        self.max_attempts,
                        failure.kind
                    );
                    return Err(failure.with_attempts(attempt));
                }
            }
        }
    }
}

/// Per-sequence attempt bookkeeping.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    /// Backoff before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&self) -> Option<Duration> {
        (self.attempt < self.policy.max_attempts).then(|| self.policy.delay_after(self.attempt))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}
