//! Exponential backoff with a shared circuit breaker.
//!
//! A [`RetryPolicy`] runs an async operation up to `max_attempts` times,
//! sleeping `min(base * 2^n, max_delay)` (plus jitter) between attempts.
//! Only errors for which [`BackendError::is_retryable`] holds are retried.
//!
//! The breaker counts *calls* whose attempts were all used up on retryable
//! errors. After `threshold` such calls in a row it opens, and every call
//! during the cooldown fails with [`BackendError::CircuitOpen`] without
//! running the operation. The first call after the cooldown closes it again.
//! A success resets the count; a non-retryable error leaves it untouched.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{BackendError, Result};

/// Snapshot of a policy's circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitStatus {
    pub open: bool,
    pub consecutive_failures: u32,
    pub threshold: u32,
    /// Zero when the circuit is closed.
    pub cooldown_remaining: Duration,
}

#[derive(Debug, Default)]
struct Breaker {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Retry policy; one instance is shared by every call that should trip the
/// same breaker.
#[derive(Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
    threshold: u32,
    cooldown: Duration,
    breaker: Mutex<Breaker>,
}

impl Default for RetryPolicy {
    /// 3 attempts, 1s base delay capped at 8s, ±40% jitter, breaker opening
    /// after 5 exhausted calls for 60s.
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` total attempts (at least one) and the given
    /// base delay; everything else at its default.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(8),
            jitter: 0.4,
            threshold: 5,
            cooldown: Duration::from_secs(60),
            breaker: Mutex::new(Breaker::default()),
        }
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Relative jitter applied to each delay, clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Breaker settings. A threshold of 0 disables the breaker.
    #[must_use]
    pub fn with_circuit_breaker(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.threshold = threshold;
        self.cooldown = cooldown;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let max = self.max_delay.as_secs_f64();
        let mut secs = (self.base_delay.as_secs_f64() * 2f64.powi(exponent)).min(max);
        if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
            secs = (secs * (1.0 + factor)).min(max);
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Run `operation` under this policy.
    ///
    /// Returns the first success, the first non-retryable error, or the last
    /// error once every attempt has been used.
    pub async fn execute<T, F, Fut>(&self, context: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit(context)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => {
                    self.record_success(context);
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    debug!("{}: non-retryable error on attempt {}: {}", context, attempt, e);
                    return Err(e);
                }
                Err(e) if attempt >= self.max_attempts => {
                    warn!("{}: all {} attempts failed: {}", context, self.max_attempts, e);
                    self.record_exhausted(context);
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        "{}: attempt {}/{} failed ({}), retrying in {:?}",
                        context, attempt, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    pub fn circuit_status(&self) -> CircuitStatus {
        let breaker = self.breaker();
        let cooldown_remaining = breaker
            .opened_at
            .map_or(Duration::ZERO, |opened| self.cooldown.saturating_sub(opened.elapsed()));
        CircuitStatus {
            open: breaker.opened_at.is_some(),
            consecutive_failures: breaker.consecutive_failures,
            threshold: self.threshold,
            cooldown_remaining,
        }
    }

    /// Close the breaker and clear the failure count.
    pub fn reset_circuit(&self) {
        let mut breaker = self.breaker();
        if breaker.opened_at.is_some() {
            info!("circuit breaker manually reset");
        }
        *breaker = Breaker::default();
    }

    fn breaker(&self) -> std::sync::MutexGuard<'_, Breaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self, context: &str) -> Result<()> {
        let mut breaker = self.breaker();
        let Some(opened) = breaker.opened_at else {
            return Ok(());
        };

        let elapsed = opened.elapsed();
        if elapsed < self.cooldown {
            let remaining = self.cooldown - elapsed;
            warn!("{}: rejected, circuit open for another {:?}", context, remaining);
            return Err(BackendError::CircuitOpen { remaining });
        }

        info!("{}: circuit breaker closed after cooldown", context);
        *breaker = Breaker::default();
        Ok(())
    }

    fn record_success(&self, context: &str) {
        let mut breaker = self.breaker();
        if breaker.consecutive_failures > 0 {
            debug!(
                "{}: succeeded after {} failed call(s)",
                context, breaker.consecutive_failures
            );
            breaker.consecutive_failures = 0;
        }
    }

    fn record_exhausted(&self, context: &str) {
        let mut breaker = self.breaker();
        breaker.consecutive_failures += 1;
        if self.threshold > 0
            && breaker.consecutive_failures >= self.threshold
            && breaker.opened_at.is_none()
        {
            warn!(
                "{}: circuit breaker opened after {} consecutive failures (cooldown {:?})",
                context, breaker.consecutive_failures, self.cooldown
            );
            breaker.opened_at = Some(Instant::now());
        }
    }
}
