//! Bounded retry with exponential backoff.
//!
//! ```text
//! attempt 1 ── fail ── sleep ~500ms ── attempt 2 ── fail ── sleep ~750ms ── ...
//!                                       (each sleep ±50%, capped at 1s)
//! ```
//!
//! The last sleep is shortened so that one final attempt lands on the
//! deadline. Once an attempt fails with the deadline reached, the executor
//! gives up and returns the most recent error wrapped in [`Error::GaveUp`]. Errors that are not [`Error::is_retryable`] are returned
//! immediately and unwrapped.

use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub initial_interval: Duration,
    pub multiplier: f64,
    /// Each delay is drawn uniformly from `interval * (1 ± randomization)`.
    pub randomization: f64,
    /// Upper bound for a single sleep.
    pub max_interval: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization: 0.5,
            max_interval: Duration::from_secs(1),
        }
    }
}

impl Backoff {
    /// Fixed delay, no growth and no jitter. Mostly useful in tests.
    pub fn constant(delay: Duration) -> Self {
        Backoff {
            initial_interval: delay,
            multiplier: 1.0,
            randomization: 0.0,
            max_interval: delay,
        }
    }

    /// Un-jittered interval after `failures` failed attempts (1-based).
    pub fn base_interval(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(64) as i32;
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_interval.as_secs_f64()))
    }

    /// Interval after `failures` failed attempts with jitter applied.
    pub fn delay(&self, failures: u32) -> Duration {
        let base = self.base_interval(failures).as_secs_f64();
        let spread = base * self.randomization.clamp(0.0, 1.0);
        let jittered = if spread > 0.0 {
            rand::thread_rng().gen_range((base - spread)..=(base + spread))
        } else {
            base
        };
        Duration::from_secs_f64(jittered.min(self.max_interval.as_secs_f64()))
    }
}

/// Retry policy: backoff, deadline and optional cancellation.
#[derive(Debug, Clone)]
pub struct Retry {
    backoff: Backoff,
    deadline: Duration,
    cancel: Option<CancellationToken>,
}

impl Retry {
    pub fn new(deadline: Duration) -> Self {
        Retry {
            backoff: Backoff::default(),
            deadline,
            cancel: None,
        }
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Abort with [`Error::Cancelled`] when `token` fires, even mid-sleep.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run `op` until it succeeds, fails permanently, or the deadline passes.
    ///
    /// `what` names the target in logs and in the "gave up" error.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            if self.is_cancelled() {
                return Err(Error::Cancelled(format!("waiting for {}", what)));
            }

            attempts += 1;
            let err = match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        tracing::info!(
                            "{} succeeded after {} attempts ({:?})",
                            what,
                            attempts,
                            start.elapsed()
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::debug!("{} failed permanently: {}", what, e);
                    return Err(e);
                }
                Err(e) => e,
            };

            let elapsed = start.elapsed();
            if elapsed >= self.deadline {
                tracing::debug!(
                    "Giving up on {} after {} attempts ({:?}): {}",
                    what,
                    attempts,
                    elapsed,
                    err
                );
                return Err(Error::GaveUp {
                    target: what.to_string(),
                    attempts,
                    source: Box::new(err),
                });
            }

            let delay = self.backoff.delay(attempts).min(self.deadline - elapsed);
            tracing::debug!(
                "{} attempt {} failed, retrying in {:?}: {}",
                what,
                attempts,
                delay,
                err
            );

            match &self.cancel {
                Some(token) => {
                    tokio::select! {
                        _ = token.cancelled() => {
                            return Err(Error::Cancelled(format!("waiting for {}", what)));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// [`Retry::run`] with the default backoff and no cancellation.
pub async fn retry<T, F, Fut>(deadline: Duration, what: &str, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    Retry::new(deadline).run(what, op).await
}
