//! Retry policy for network operations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default backoff base in milliseconds.
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 100;

/// Default backoff ceiling in milliseconds (five minutes).
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 300_000;

/// Default per-attempt timeout in seconds (fifteen minutes).
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 900;

/// Attempt budget, backoff and timeouts for one class of operations.
///
/// Immutable once built; share it freely across concurrent operations.
/// The sleep after failed attempt `n` is `min(2^n * base, ceiling)`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use rusty_artifacts_transfer::RetryPolicy;
///
/// let policy = RetryPolicy::default()
///     .with_max_attempts(3)
///     .with_attempt_timeout(Duration::from_secs(60));
///
/// assert_eq!(policy.max_attempts(), 3);
/// assert_eq!(policy.backoff_for(1), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff_ms: u64,
    max_backoff_ms: u64,
    attempt_timeout_ms: u64,
    overall_deadline_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            attempt_timeout_ms: DEFAULT_ATTEMPT_TIMEOUT_SECS * 1000,
            overall_deadline_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Set the attempt budget. Values below 1 are raised to 1.
    ///
    /// # Arguments
    /// * `max_attempts` - Total attempts, including the first
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the backoff base.
    ///
    /// # Arguments
    /// * `base` - Multiplied by `2^attempt` for each sleep
    pub fn with_base_backoff(mut self, base: Duration) -> Self {
        self.base_backoff_ms = duration_ms(base);
        self
    }

    /// Set the backoff ceiling.
    ///
    /// # Arguments
    /// * `ceiling` - Upper bound on any single sleep
    pub fn with_max_backoff(mut self, ceiling: Duration) -> Self {
        self.max_backoff_ms = duration_ms(ceiling);
        self
    }

    /// Set the per-attempt timeout.
    ///
    /// # Arguments
    /// * `timeout` - How long one attempt may run before it is abandoned
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = duration_ms(timeout);
        self
    }

    /// Bound the total wall-clock time of the whole retry sequence.
    ///
    /// No new attempt is scheduled if its backoff would end past the deadline.
    ///
    /// # Arguments
    /// * `deadline` - Overall deadline (None = unbounded)
    pub fn with_overall_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.overall_deadline_ms = deadline.map(duration_ms);
        self
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Backoff base.
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    /// Backoff ceiling.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Per-attempt timeout.
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Overall deadline, if any.
    pub fn overall_deadline(&self) -> Option<Duration> {
        self.overall_deadline_ms.map(Duration::from_millis)
    }

    /// Sleep to insert after failed attempt `attempt` (1-based).
    ///
    /// # Arguments
    /// * `attempt` - Number of the attempt that just failed
    ///
    /// # Returns
    /// `min(2^attempt * base, ceiling)`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor: u64 = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis: u64 = factor
            .saturating_mul(self.base_backoff_ms)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
