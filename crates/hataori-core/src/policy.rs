//! Backoff, retry and timeout policies.

use crate::error::WorkflowError;
use std::time::Duration;

/// Maps a retry attempt number to a wait duration.
///
/// Attempt numbers start at 1 for the first retry. The mapping is pure:
/// the same attempt and configuration always give the same delay.
///
/// # Examples
///
/// ```
/// use hataori_core::BackoffStrategy;
/// use std::time::Duration;
///
/// let backoff = BackoffStrategy::exponential(
///     Duration::from_millis(100),
///     Duration::from_millis(2000),
/// )?;
///
/// let delays: Vec<u128> = (1..=6).map(|n| backoff.delay(n).as_millis()).collect();
/// assert_eq!(delays, vec![100, 200, 400, 800, 1600, 2000]);
/// # Ok::<(), hataori_core::WorkflowError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay for every attempt, uncapped.
    Fixed {
        /// Delay between each retry.
        delay: Duration,
    },
    /// `initial × attempt`, capped at `max`.
    Linear {
        /// Delay before the first retry.
        initial: Duration,
        /// Maximum delay cap.
        max: Duration,
    },
    /// `initial × 2^(attempt − 1)`, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Maximum delay cap.
        max: Duration,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Fixed {
            delay: Duration::ZERO,
        }
    }
}

impl BackoffStrategy {
    /// Creates a fixed backoff.
    pub fn fixed(delay: Duration) -> Self {
        BackoffStrategy::Fixed { delay }
    }

    /// Creates a linear backoff.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Configuration`] if `max` is less than `initial`.
    pub fn linear(initial: Duration, max: Duration) -> Result<Self, WorkflowError> {
        check_cap(initial, max)?;
        Ok(BackoffStrategy::Linear { initial, max })
    }

    /// Creates an exponential backoff.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Configuration`] if `max` is less than `initial`.
    pub fn exponential(initial: Duration, max: Duration) -> Result<Self, WorkflowError> {
        check_cap(initial, max)?;
        Ok(BackoffStrategy::Exponential { initial, max })
    }

    /// Resolves a strategy by name: `fixed`, `linear` or `exponential`.
    ///
    /// `max` is ignored by `fixed`.
    pub fn from_name(name: &str, initial: Duration, max: Duration) -> Result<Self, WorkflowError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::fixed(initial)),
            "linear" => Self::linear(initial, max),
            "exponential" => Self::exponential(initial, max),
            other => Err(WorkflowError::Configuration(format!(
                "unknown backoff strategy '{}'",
                other
            ))),
        }
    }

    /// Calculates the delay before retry number `attempt`.
    ///
    /// Attempt `0` is treated as `1`. Arithmetic saturates instead of
    /// overflowing, so very large attempts simply hit the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            BackoffStrategy::Fixed { delay } => delay,
            BackoffStrategy::Linear { initial, max } => initial.saturating_mul(attempt).min(max),
            BackoffStrategy::Exponential { initial, max } => match 2u32.checked_pow(attempt - 1) {
                Some(factor) => initial.saturating_mul(factor).min(max),
                None => max,
            },
        }
    }
}

fn check_cap(initial: Duration, max: Duration) -> Result<(), WorkflowError> {
    if max < initial {
        return Err(WorkflowError::Configuration(
            "max_delay must be >= initial_delay".to_string(),
        ));
    }
    Ok(())
}

/// Decides whether a failed task is retried and how long to wait first.
///
/// # Examples
///
/// ```
/// use hataori_core::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::fixed(2, Duration::from_millis(10));
/// assert!(policy.should_retry(0));
/// assert!(policy.should_retry(1));
/// assert!(!policy.should_retry(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffStrategy,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` retries after the first failure.
    pub fn new(max_attempts: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// No retry: the first failure is terminal.
    pub fn none() -> Self {
        Self::default()
    }

    /// Retries `max_attempts` times with a constant delay.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, BackoffStrategy::fixed(delay))
    }

    /// Retries with exponential backoff capped at 60 seconds.
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        let max = Duration::from_secs(60).max(initial_delay);
        Self::new(
            max_attempts,
            BackoffStrategy::Exponential {
                initial: initial_delay,
                max,
            },
        )
    }

    /// Returns the maximum number of retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the backoff strategy.
    pub fn backoff(&self) -> &BackoffStrategy {
        &self.backoff
    }

    /// Returns `true` if a task that has already been retried `attempt`
    /// times may be retried again.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Returns the delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

/// Bounds a single task attempt.
///
/// A zero duration disables enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    duration: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
        }
    }
}

impl TimeoutPolicy {
    /// Creates a timeout of `duration`. Zero means no timeout.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Never times out.
    pub fn none() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns the enforced duration, or `None` when disabled.
    pub fn duration(&self) -> Option<Duration> {
        (!self.duration.is_zero()).then_some(self.duration)
    }
}
