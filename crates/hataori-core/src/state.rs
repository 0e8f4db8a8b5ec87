//! Workflow status and the checkpoint payloads written to a state store.

use crate::task::TaskStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a workflow.
///
/// `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Built but never executed.
    #[default]
    Pending,
    /// Stepping through tasks.
    Running,
    /// Stopped at a checkpoint, waiting for `resume`.
    Paused,
    /// Every task finished.
    Completed,
    /// A task, hook or middleware failed.
    Failed,
    /// Stopped by `cancel`.
    Cancelled,
}

impl WorkflowStatus {
    /// Returns `true` for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    /// Lowercase name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checkpoint of a workflow: where to pick up on `resume`.
///
/// Serialized as `{"status": "...", "currentTaskIndex": n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    /// Workflow status at checkpoint time.
    pub status: WorkflowStatus,
    /// Index of the next task to run.
    pub current_task_index: usize,
}

/// Persisted state of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskState {
    /// Task status after its last `run`.
    pub status: TaskStatus,
}
