//! Retry logic with exponential backoff for handling transient failures.
//!
//! The resilient transport uses this to re-send outbound calls that fail with a
//! network error, a timeout, or a transient HTTP status.
//!
//! # Backoff
//!
//! The delay before retry `n` (1-based) is `base_delay * multiplier^n`, capped at
//! `max_delay`. With the defaults (1s base, multiplier 2) that gives 2s, 4s, 8s.
//!
//! # Example
//!
//! ```rust
//! use todo_sync_runtime::retry::{RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(3)
//!     .base_delay(Duration::from_millis(10))
//!     .build();
//!
//! let result = retry_with_predicate(
//!     &policy,
//!     || async { Ok::<_, String>(42) },
//!     |err: &String| err.contains("transient"),
//! )
//! .await?;
//! assert_eq!(result, 42);
//! # Ok(())
//! # }
//! ```

use crate::metrics::RetryMetrics;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 3 (so at most 4 attempts in total)
/// - `base_delay`: 1 second
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: usize,
    /// Backoff base
    pub base_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            base_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Total number of attempts, the first one included.
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    ///
    /// `delay = base_delay * multiplier^retry`, capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, retry: usize) -> Duration {
        let exponent = retry.min(i32::MAX as usize) as i32;
        let delay_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }

        Duration::from_millis(delay_ms as u64)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    base_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set the backoff base.
    #[must_use]
    pub const fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(3),
            base_delay: self.base_delay.unwrap_or(Duration::from_secs(1)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
        }
    }
}

/// Progress of a single retried call. Lives only for the duration of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Attempt about to run (1-based)
    pub attempt: usize,
    /// Upper bound on attempts
    pub max_attempts: usize,
    /// Delay before the next attempt, if there will be one
    pub next_delay: Duration,
}

impl RetryState {
    fn start(policy: &RetryPolicy) -> Self {
        Self {
            attempt: 1,
            max_attempts: policy.max_attempts(),
            next_delay: policy.delay_for_attempt(1),
        }
    }

    const fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    fn advance(&mut self, policy: &RetryPolicy) {
        self.attempt += 1;
        self.next_delay = policy.delay_for_attempt(self.attempt);
    }
}

/// Retry an async operation while `is_retryable` accepts its error.
///
/// Returns the first success, the first non-retryable error, or the error of
/// the last attempt once the policy is exhausted.
///
/// # Errors
///
/// Returns the operation's error as described above.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut state = RetryState::start(policy);

    loop {
        RetryMetrics::record_attempt();

        match operation().await {
            Ok(result) => {
                if state.attempt > 1 {
                    RetryMetrics::record_success();
                    tracing::info!(attempt = state.attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::debug!(
                        attempt = state.attempt,
                        error = %err,
                        "Error is not retryable, failing immediately"
                    );
                    return Err(err);
                }

                if state.exhausted() {
                    RetryMetrics::record_exhausted();
                    tracing::error!(
                        attempt = state.attempt,
                        max_attempts = state.max_attempts,
                        error = %err,
                        "Operation failed after max retries"
                    );
                    return Err(err);
                }

                tracing::warn!(
                    attempt = state.attempt,
                    delay_ms = u64::try_from(state.next_delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Operation failed, retrying..."
                );

                sleep(state.next_delay).await;
                state.advance(policy);
            }
        }
    }
}
