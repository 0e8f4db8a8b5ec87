//! The workflow orchestrator.

use crate::builder::WorkflowBuilder;
use crate::events::EventBus;
use crate::hooks::{HookEvent, HookManager};
use crate::middleware::MiddlewarePipeline;
use hataori_core::{
    Context, ErrorHandler, Runnable, StateStore, TaskName, TaskStatus, WorkflowError,
    WorkflowState, WorkflowStatus,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Checks workflow input and returns every violation found.
pub type Validator = Arc<dyn Fn(&Value) -> Vec<String> + Send + Sync>;

/// Shared handle on a workflow's status.
///
/// The workflow checks it before every task, so pausing or cancelling
/// through any clone takes effect once the task in flight finishes. Hand a
/// clone to a task to let it pause or cancel its own workflow.
#[derive(Debug, Clone, Default)]
pub struct WorkflowController {
    status: Arc<Mutex<WorkflowStatus>>,
}

impl WorkflowController {
    /// Creates a controller in [`WorkflowStatus::Pending`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current status.
    pub fn status(&self) -> WorkflowStatus {
        *self.status.lock()
    }

    /// Requests a pause. Returns `false` unless the workflow was running.
    pub fn pause(&self) -> bool {
        self.transition(&[WorkflowStatus::Running], WorkflowStatus::Paused)
            .is_ok()
    }

    /// Requests cancellation. Returns `false` unless the workflow was running
    /// or paused.
    pub fn cancel(&self) -> bool {
        self.transition(
            &[WorkflowStatus::Running, WorkflowStatus::Paused],
            WorkflowStatus::Cancelled,
        )
        .is_ok()
    }

    /// Returns `true` once a pause has been requested.
    pub fn is_paused(&self) -> bool {
        self.status() == WorkflowStatus::Paused
    }

    /// Returns `true` once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.status() == WorkflowStatus::Cancelled
    }

    pub(crate) fn set(&self, status: WorkflowStatus) {
        *self.status.lock() = status;
    }

    /// Moves to `to` if the current status is one of `from`; otherwise
    /// returns the current status.
    pub(crate) fn transition(
        &self,
        from: &[WorkflowStatus],
        to: WorkflowStatus,
    ) -> Result<(), WorkflowStatus> {
        let mut status = self.status.lock();
        if from.contains(&status) {
            *status = to;
            Ok(())
        } else {
            Err(*status)
        }
    }
}

#[derive(Default)]
struct Cursor {
    index: usize,
    context: Option<Context>,
}

/// An ordered list of tasks run under one shared context.
///
/// Tasks run strictly in order, each wrapped in the middleware pipeline and
/// surrounded by `onTaskStart`/`onTaskFinish` hooks. After every task the
/// checkpoint (`status` plus the index of the next task) is persisted, so
/// a paused or restored workflow resumes without re-running finished tasks.
///
/// # Examples
///
/// ```
/// use hataori::prelude::*;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), WorkflowError> {
/// let workflow = Workflow::builder()
///     .name("greeting")
///     .step_fn("upper", |ctx: Context| async move {
///         Ok(json!(ctx.input()["name"].as_str().unwrap_or_default().to_uppercase()))
///     })
///     .step_fn("greet", |ctx: Context| async move {
///         let name = ctx.task_output("upper").unwrap_or_default();
///         Ok(json!(format!("hello {}", name.as_str().unwrap_or_default())))
///     })
///     .build()?;
///
/// let output = workflow.execute(json!({ "name": "ada" })).await?;
/// assert_eq!(output, json!({ "upper": "ADA", "greet": "hello ADA" }));
/// assert_eq!(workflow.status(), WorkflowStatus::Completed);
/// # Ok(())
/// # }
/// ```
pub struct Workflow {
    name: String,
    tasks: Vec<Arc<dyn Runnable>>,
    pipeline: Arc<MiddlewarePipeline>,
    hooks: HookManager,
    error_handler: Arc<dyn ErrorHandler>,
    store: Option<Arc<dyn StateStore>>,
    validator: Option<Validator>,
    events: Option<EventBus>,
    controller: WorkflowController,
    cursor: Mutex<Cursor>,
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field(
                "tasks",
                &self.tasks.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .field("status", &self.status())
            .field("current_task_index", &self.current_task_index())
            .finish_non_exhaustive()
    }
}

impl Workflow {
    /// Creates a new workflow builder.
    pub fn builder() -> WorkflowBuilder {
        WorkflowBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        name: String,
        tasks: Vec<Arc<dyn Runnable>>,
        pipeline: Arc<MiddlewarePipeline>,
        hooks: HookManager,
        error_handler: Arc<dyn ErrorHandler>,
        store: Option<Arc<dyn StateStore>>,
        validator: Option<Validator>,
        events: Option<EventBus>,
        controller: WorkflowController,
    ) -> Self {
        Self {
            name,
            tasks,
            pipeline,
            hooks,
            error_handler,
            store,
            validator,
            events,
            controller,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    /// Returns the workflow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the tasks in execution order.
    pub fn tasks(&self) -> &[Arc<dyn Runnable>] {
        &self.tasks
    }

    /// Returns a handle that can pause or cancel this workflow.
    pub fn controller(&self) -> WorkflowController {
        self.controller.clone()
    }

    /// Returns the current status.
    pub fn status(&self) -> WorkflowStatus {
        self.controller.status()
    }

    /// Returns the status of every task, in order.
    pub fn tasks_status(&self) -> Vec<(TaskName, TaskStatus)> {
        self.tasks
            .iter()
            .map(|task| (task.name().clone(), task.status()))
            .collect()
    }

    /// Returns the index of the next task to run.
    pub fn current_task_index(&self) -> usize {
        self.cursor.lock().index
    }

    /// Returns the context of the current or most recent execution.
    pub fn context(&self) -> Option<Context> {
        self.cursor.lock().context.clone()
    }

    /// Returns the checkpoint as it would be persisted now.
    pub fn checkpoint_state(&self) -> WorkflowState {
        WorkflowState {
            status: self.status(),
            current_task_index: self.current_task_index(),
        }
    }

    /// Overwrites status and task index, typically from a persisted
    /// checkpoint before calling [`resume`](Self::resume). Nothing is run.
    pub fn restore_state(&self, status: WorkflowStatus, current_task_index: usize) {
        self.controller.set(status);
        self.cursor.lock().index = current_task_index;
        debug!(
            "Workflow '{}' restored to {} at task {}",
            self.name, status, current_task_index
        );
    }

    /// Loads this workflow's checkpoint from the state store and applies it.
    ///
    /// Returns `false` if there is no store or no checkpoint.
    pub async fn restore_from_store(&self) -> Result<bool, WorkflowError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        match store.get_workflow_state(&self.name).await? {
            Some(state) => {
                self.restore_state(state.status, state.current_task_index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs every task from the first one against a fresh context.
    ///
    /// Returns the collapsed task outputs on completion, or the context
    /// output so far if the workflow was paused or cancelled.
    ///
    /// # Errors
    ///
    /// - [`WorkflowError::InvalidState`] if the workflow is running or paused.
    /// - [`WorkflowError::Validation`] if the validator rejects `input`; the
    ///   status is left unchanged.
    /// - The first error raised by a task, hook or middleware. The workflow
    ///   is then `Failed`.
    pub async fn execute(&self, input: Value) -> Result<Value, WorkflowError> {
        let status = self.status();
        if matches!(status, WorkflowStatus::Running | WorkflowStatus::Paused) {
            return Err(WorkflowError::InvalidState {
                operation: "execute",
                status,
            });
        }

        if let Some(validator) = &self.validator {
            let violations = validator(&input);
            if !violations.is_empty() {
                warn!(
                    "Workflow '{}' input rejected: {}",
                    self.name,
                    violations.join("; ")
                );
                return Err(WorkflowError::Validation { violations });
            }
        }

        self.controller
            .transition(
                &[
                    WorkflowStatus::Pending,
                    WorkflowStatus::Completed,
                    WorkflowStatus::Failed,
                    WorkflowStatus::Cancelled,
                ],
                WorkflowStatus::Running,
            )
            .map_err(|status| WorkflowError::InvalidState {
                operation: "execute",
                status,
            })?;

        let ctx = Context::new(input);
        {
            let mut cursor = self.cursor.lock();
            cursor.index = 0;
            cursor.context = Some(ctx.clone());
        }
        info!("Workflow '{}' started", self.name);
        self.emit("workflow:running", json!({ "workflow": self.name, "index": 0 }));

        let outcome = match self
            .hooks
            .execute_hooks(HookEvent::WorkflowStart { context: &ctx })
            .await
        {
            Ok(()) => self.step_through(&ctx).await,
            Err(e) => Err(e),
        };
        self.settle(&ctx, outcome).await
    }

    /// Continues a paused workflow from its checkpoint.
    ///
    /// The context of the interrupted execution is reused; a workflow
    /// restored from a checkpoint on a fresh instance gets a new context
    /// with a null input.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::InvalidState`] unless the workflow is paused, plus
    /// everything [`execute`](Self::execute) can fail with after validation.
    pub async fn resume(&self) -> Result<Value, WorkflowError> {
        self.controller
            .transition(&[WorkflowStatus::Paused], WorkflowStatus::Running)
            .map_err(|status| WorkflowError::InvalidState {
                operation: "resume",
                status,
            })?;

        let (ctx, index) = {
            let mut cursor = self.cursor.lock();
            let ctx = cursor
                .context
                .get_or_insert_with(|| Context::new(Value::Null))
                .clone();
            (ctx, cursor.index)
        };
        info!("Workflow '{}' resumed at task {}", self.name, index);
        self.emit(
            "workflow:running",
            json!({ "workflow": self.name, "index": index }),
        );

        let outcome = self.step_through(&ctx).await;
        self.settle(&ctx, outcome).await
    }

    /// Pauses before the next task. Returns `false`, and does nothing,
    /// unless the workflow is running.
    pub fn pause(&self) -> bool {
        if self.controller.pause() {
            info!("Workflow '{}' pause requested", self.name);
            self.emit("workflow:paused", json!({ "workflow": self.name }));
            true
        } else {
            warn!(
                "Cannot pause workflow '{}' in status {}",
                self.name,
                self.status()
            );
            false
        }
    }

    /// Cancels before the next task. Returns `false`, and does nothing,
    /// unless the workflow is running or paused.
    ///
    /// A task already in flight runs to completion.
    pub fn cancel(&self) -> bool {
        if self.controller.cancel() {
            info!("Workflow '{}' cancel requested", self.name);
            self.emit("workflow:cancelled", json!({ "workflow": self.name }));
            true
        } else {
            warn!(
                "Cannot cancel workflow '{}' in status {}",
                self.name,
                self.status()
            );
            false
        }
    }

    async fn step_through(&self, ctx: &Context) -> Result<Value, WorkflowError> {
        loop {
            let index = self.current_task_index();

            match self.status() {
                WorkflowStatus::Cancelled => {
                    info!("Workflow '{}' cancelled before task {}", self.name, index);
                    self.persist().await;
                    return Ok(ctx.output());
                }
                WorkflowStatus::Paused => {
                    info!("Workflow '{}' paused before task {}", self.name, index);
                    self.persist().await;
                    return Ok(ctx.output());
                }
                _ => {}
            }

            let Some(task) = self.tasks.get(index) else {
                break;
            };
            let task_name = task.name();

            self.hooks
                .execute_hooks(HookEvent::TaskStart {
                    context: ctx,
                    task: task_name,
                })
                .await?;
            self.emit(
                "task:start",
                json!({ "workflow": self.name, "task": task_name.as_str(), "index": index }),
            );

            self.pipeline.run(task.as_ref(), ctx).await?;

            self.hooks
                .execute_hooks(HookEvent::TaskFinish {
                    context: ctx,
                    task: task_name,
                })
                .await?;
            self.emit(
                "task:finish",
                json!({ "workflow": self.name, "task": task_name.as_str(), "index": index }),
            );

            self.cursor.lock().index = index + 1;
            self.persist().await;
        }

        self.hooks
            .execute_hooks(HookEvent::AllTasksFinish { context: ctx })
            .await?;
        self.hooks
            .execute_hooks(HookEvent::WorkflowFinish { context: ctx })
            .await?;

        let output = ctx.collapse_outputs();
        ctx.set_output(output.clone());
        match self
            .controller
            .transition(&[WorkflowStatus::Running], WorkflowStatus::Completed)
        {
            Ok(()) => {
                info!("Workflow '{}' completed successfully", self.name);
                self.emit("workflow:completed", json!({ "workflow": self.name }));
            }
            Err(status) => debug!(
                "Workflow '{}' finished its tasks while {}",
                self.name, status
            ),
        }
        self.persist().await;
        Ok(output)
    }

    async fn settle(
        &self,
        ctx: &Context,
        outcome: Result<Value, WorkflowError>,
    ) -> Result<Value, WorkflowError> {
        let error = match outcome {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        self.error_handler.handle_error(&error, ctx).await;
        if let Err(hook_error) = self
            .hooks
            .execute_hooks(HookEvent::WorkflowError {
                context: ctx,
                error: &error,
            })
            .await
        {
            warn!(
                "Error hooks of workflow '{}' failed: {}",
                self.name, hook_error
            );
        }

        self.controller.set(WorkflowStatus::Failed);
        warn!("Workflow '{}' failed: {}", self.name, error);
        self.emit(
            "workflow:failed",
            json!({ "workflow": self.name, "error": error.to_string() }),
        );
        self.persist().await;
        Err(error)
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let state = self.checkpoint_state();
        if let Err(e) = store.save_workflow_state(&self.name, state).await {
            warn!("Failed to persist checkpoint of workflow '{}': {}", self.name, e);
        }
    }

    fn emit(&self, event: &str, payload: Value) {
        if let Some(bus) = &self.events {
            bus.emit(event, &payload);
        }
    }
}
