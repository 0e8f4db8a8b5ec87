//! Collaborator traits the engine reports to.

use crate::context::Context;
use crate::error::WorkflowError;
use crate::state::{TaskState, WorkflowState};
use async_trait::async_trait;

/// Receives every failure caught by a task or workflow.
///
/// Called before the retry or propagation decision is made. Implementations
/// must not fail; there is nowhere to report a failure of the reporter.
///
/// # Examples
///
/// ```
/// use hataori_core::{Context, ErrorHandler, WorkflowError};
/// use async_trait::async_trait;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct CountingHandler(AtomicUsize);
///
/// #[async_trait]
/// impl ErrorHandler for CountingHandler {
///     async fn handle_error(&self, _error: &WorkflowError, _ctx: &Context) {
///         self.0.fetch_add(1, Ordering::SeqCst);
///     }
/// }
/// ```
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Handles one caught error.
    async fn handle_error(&self, error: &WorkflowError, ctx: &Context);
}

/// Key/value persistence for checkpoints.
///
/// Workflow state is stored under the workflow name, task state under the
/// task name.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Saves a workflow checkpoint.
    async fn save_workflow_state(&self, id: &str, state: WorkflowState)
        -> Result<(), WorkflowError>;

    /// Loads a workflow checkpoint, if one exists.
    async fn get_workflow_state(&self, id: &str) -> Result<Option<WorkflowState>, WorkflowError>;

    /// Saves the state of a task.
    async fn save_task_state(&self, id: &str, state: TaskState) -> Result<(), WorkflowError>;

    /// Loads the state of a task, if one exists.
    async fn get_task_state(&self, id: &str) -> Result<Option<TaskState>, WorkflowError>;
}
