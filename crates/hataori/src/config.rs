//! Task options loaded from plain data.

use hataori_core::{BackoffStrategy, RetryPolicy, TimeoutPolicy, WorkflowError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff settings by strategy name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// One of `fixed`, `linear` or `exponential`.
    pub strategy: String,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound of the delay, in milliseconds. Ignored by `fixed`.
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: "exponential".to_string(),
            initial_delay_ms: 100,
            max_delay_ms: 60_000,
        }
    }
}

impl BackoffConfig {
    /// Resolves the named strategy.
    pub fn to_strategy(&self) -> Result<BackoffStrategy, WorkflowError> {
        BackoffStrategy::from_name(
            &self.strategy,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// Retry, timeout and backoff settings applied to a task.
///
/// Missing fields take their defaults: no retries, a 30 second timeout and
/// exponential backoff from 100 ms up to one minute.
///
/// ```
/// use hataori::config::TaskOptions;
/// use std::time::Duration;
///
/// let options = TaskOptions::from_json(r#"{
///     "retry_count": 3,
///     "timeout_ms": 5000,
///     "backoff": { "strategy": "linear", "initial_delay_ms": 200, "max_delay_ms": 1000 }
/// }"#)?;
///
/// let (retry, timeout) = options.into_policies()?;
/// assert_eq!(retry.max_attempts(), 3);
/// assert_eq!(retry.delay(2), Duration::from_millis(400));
/// assert_eq!(timeout.duration(), Some(Duration::from_secs(5)));
/// # Ok::<(), hataori_core::WorkflowError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskOptions {
    /// Number of retries after the first failure.
    pub retry_count: u32,
    /// Per-attempt timeout in milliseconds. Zero disables it.
    pub timeout_ms: u64,
    /// Delay between retries.
    pub backoff: BackoffConfig,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            retry_count: 0,
            timeout_ms: 30_000,
            backoff: BackoffConfig::default(),
        }
    }
}

impl TaskOptions {
    /// Parses options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, WorkflowError> {
        serde_json::from_str(json)
            .map_err(|e| WorkflowError::Configuration(format!("invalid task options: {}", e)))
    }

    /// Validates the options into policies.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Configuration`] for an unknown strategy name
    /// or a maximum delay below the initial delay.
    pub fn into_policies(self) -> Result<(RetryPolicy, TimeoutPolicy), WorkflowError> {
        let backoff = self.backoff.to_strategy()?;
        Ok((
            RetryPolicy::new(self.retry_count, backoff),
            TimeoutPolicy::new(Duration::from_millis(self.timeout_ms)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TaskOptions::from_json("{}").unwrap();
        assert_eq!(options, TaskOptions::default());

        let (retry, timeout) = options.into_policies().unwrap();
        assert_eq!(retry.max_attempts(), 0);
        assert_eq!(timeout.duration(), Some(Duration::from_secs(30)));
        assert_eq!(retry.delay(1), Duration::from_millis(100));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let options = TaskOptions::from_json(r#"{ "backoff": { "strategy": "random" } }"#).unwrap();
        match options.into_policies() {
            Err(WorkflowError::Configuration(message)) => assert!(message.contains("random")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeout_disables_enforcement() {
        let options = TaskOptions {
            timeout_ms: 0,
            ..TaskOptions::default()
        };
        let (_, timeout) = options.into_policies().unwrap();
        assert_eq!(timeout.duration(), None);
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            TaskOptions::from_json("{ retry_count: }"),
            Err(WorkflowError::Configuration(_))
        ));
    }
}
