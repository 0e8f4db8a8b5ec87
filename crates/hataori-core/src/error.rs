//! Workflow error types.

use crate::state::WorkflowStatus;
use crate::task::TaskName;
use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by units of work.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The lifecycle event whose hook set failed.
///
/// Used in [`WorkflowError::HookError`] and as the registration key of the
/// hook manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    /// Fired once before the first task of an `execute` call.
    OnWorkflowStart,
    /// Fired before every task in the sequential loop.
    OnTaskStart,
    /// Fired after every task in the sequential loop.
    OnTaskFinish,
    /// Fired after the last task, before `OnWorkflowFinish`.
    OnAllTasksFinish,
    /// Fired when the workflow completes.
    OnWorkflowFinish,
    /// Fired when the workflow fails.
    OnWorkflowError,
}

impl HookType {
    /// All hook types, in lifecycle order.
    pub const ALL: [HookType; 6] = [
        HookType::OnWorkflowStart,
        HookType::OnTaskStart,
        HookType::OnTaskFinish,
        HookType::OnAllTasksFinish,
        HookType::OnWorkflowFinish,
        HookType::OnWorkflowError,
    ];
}

impl std::fmt::Display for HookType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookType::OnWorkflowStart => write!(f, "onWorkflowStart"),
            HookType::OnTaskStart => write!(f, "onTaskStart"),
            HookType::OnTaskFinish => write!(f, "onTaskFinish"),
            HookType::OnAllTasksFinish => write!(f, "onAllTasksFinish"),
            HookType::OnWorkflowFinish => write!(f, "onWorkflowFinish"),
            HookType::OnWorkflowError => write!(f, "onWorkflowError"),
        }
    }
}

/// Errors that can occur while building or running tasks and workflows.
///
/// # Non-Exhaustive
///
/// This enum is marked `#[non_exhaustive]` so new variants can be added
/// without breaking downstream code. Always include a wildcard arm:
///
/// ```
/// use hataori_core::WorkflowError;
///
/// fn describe(error: &WorkflowError) -> String {
///     match error {
///         WorkflowError::Timeout { task_name, .. } => format!("{} timed out", task_name),
///         WorkflowError::Execution { task_name, .. } => format!("{} failed", task_name),
///         WorkflowError::Validation { violations } => violations.join(", "),
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// Workflow input was rejected by the caller-supplied validator.
    #[error("Validation failed: {}", violations.join("; "))]
    Validation {
        /// Every violation reported by the validator.
        violations: Vec<String>,
    },

    /// A single task attempt exceeded its timeout.
    #[error("Timeout occurred in task: {task_name} (after {timeout:?})")]
    Timeout {
        /// The task that timed out.
        task_name: TaskName,
        /// The configured timeout.
        timeout: Duration,
    },

    /// A unit of work failed and all retry attempts have been exhausted.
    #[error("Task failed: {task_name}, details: {source}")]
    Execution {
        /// The task that failed.
        task_name: TaskName,
        /// The unit of work's own error.
        #[source]
        source: BoxError,
    },

    /// An operation was attempted in a status that forbids it.
    #[error("Cannot {operation} workflow in status {status}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The status at the time of the call.
        status: WorkflowStatus,
    },

    /// Build-time misconfiguration.
    #[error("Invalid workflow configuration: {0}")]
    Configuration(String),

    /// A lifecycle hook failed.
    #[error("Hook '{hook_type}' failed: {details}")]
    HookError {
        /// Which hook set failed.
        hook_type: HookType,
        /// Details about the failure.
        details: String,
    },

    /// The state store rejected a read or write.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// No workflow is registered under the given name.
    #[error("Workflow not found: {0}")]
    NotFound(String),
}

impl WorkflowError {
    /// Wraps an arbitrary error as an [`WorkflowError::Execution`] of `task_name`.
    pub fn execution(task_name: impl Into<TaskName>, source: impl Into<BoxError>) -> Self {
        WorkflowError::Execution {
            task_name: task_name.into(),
            source: source.into(),
        }
    }

    /// Returns `true` for [`WorkflowError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, WorkflowError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let error = WorkflowError::execution("fetch", "connection refused");
        assert_eq!(
            error.to_string(),
            "Task failed: fetch, details: connection refused"
        );

        let error = WorkflowError::Validation {
            violations: vec!["missing id".to_string(), "bad email".to_string()],
        };
        assert_eq!(error.to_string(), "Validation failed: missing id; bad email");

        let error = WorkflowError::InvalidState {
            operation: "resume",
            status: WorkflowStatus::Completed,
        };
        assert_eq!(error.to_string(), "Cannot resume workflow in status completed");
    }

    #[test]
    fn test_execution_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let error = WorkflowError::execution("write", io);
        let source = error.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("disk full"));
        assert!(!error.is_timeout());
    }

    #[test]
    fn test_hook_type_display() {
        assert_eq!(HookType::OnWorkflowStart.to_string(), "onWorkflowStart");
        assert_eq!(HookType::OnWorkflowError.to_string(), "onWorkflowError");
        assert_eq!(HookType::ALL.len(), 6);
    }
}
