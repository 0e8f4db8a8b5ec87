//! The retrying, timed task.

use crate::logging::LoggingErrorHandler;
use async_trait::async_trait;
use hataori_core::{
    BoxError, Context, ErrorHandler, FnWork, RetryPolicy, Runnable, StateStore, TaskName,
    TaskState, TaskStatus, TimeoutPolicy, Work, WorkflowError,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Status slot shared by every runnable implementation.
#[derive(Debug, Default)]
pub(crate) struct StatusCell(Mutex<TaskStatus>);

impl StatusCell {
    pub(crate) fn get(&self) -> TaskStatus {
        *self.0.lock()
    }

    pub(crate) fn set(&self, status: TaskStatus) {
        *self.0.lock() = status;
    }
}

/// A named unit of work with its own retry and timeout policy.
///
/// Each attempt races the work against the timeout. Failures, timeouts
/// included, are reported to the error handler and retried per the retry
/// policy; once retries are exhausted the last error is returned.
///
/// # Examples
///
/// ```
/// use hataori::prelude::*;
/// use serde_json::json;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let task = Task::from_fn("greet", |ctx: Context| async move {
///     Ok(json!(format!("hello {}", ctx.input()["name"].as_str().unwrap_or("?"))))
/// })
/// .with_retry(RetryPolicy::fixed(2, Duration::from_millis(10)))
/// .with_timeout(Duration::from_secs(1));
///
/// let ctx = Context::new(json!({ "name": "Ada" }));
/// let value = task.run(&ctx).await.expect("task failed");
/// assert_eq!(value, json!("hello Ada"));
/// assert_eq!(ctx.task_output("greet"), Some(json!("hello Ada")));
/// assert_eq!(task.status(), TaskStatus::Completed);
/// # }
/// ```
pub struct Task {
    name: TaskName,
    work: Arc<dyn Work>,
    retry: RetryPolicy,
    timeout: TimeoutPolicy,
    status: StatusCell,
    error_handler: Arc<dyn ErrorHandler>,
    store: Option<Arc<dyn StateStore>>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("status", &self.status.get())
            .field("persisted", &self.store.is_some())
            .finish()
    }
}

impl Task {
    /// Creates a task with default policies: no retry, 30 second timeout.
    pub fn new<W: Work + 'static>(name: impl Into<TaskName>, work: W) -> Self {
        Self::from_shared(name, Arc::new(work))
    }

    /// Creates a task from a closure returning a future.
    pub fn from_fn<F, Fut>(name: impl Into<TaskName>, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        Self::new(name, FnWork::new(f))
    }

    /// Creates a task around already shared work.
    pub fn from_shared(name: impl Into<TaskName>, work: Arc<dyn Work>) -> Self {
        Self {
            name: name.into(),
            work,
            retry: RetryPolicy::none(),
            timeout: TimeoutPolicy::default(),
            status: StatusCell::default(),
            error_handler: Arc::new(LoggingErrorHandler),
            store: None,
        }
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-attempt timeout. `Duration::ZERO` disables it.
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = TimeoutPolicy::new(duration);
        self
    }

    /// Sets the timeout policy.
    pub fn with_timeout_policy(mut self, timeout: TimeoutPolicy) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the handler every caught failure is reported to.
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Persists `{status}` under the task name after every run.
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Returns the retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the timeout policy.
    pub fn timeout_policy(&self) -> &TimeoutPolicy {
        &self.timeout
    }

    async fn attempt(&self, ctx: &Context) -> Result<Value, WorkflowError> {
        let work = self.work.execute(ctx);
        let outcome = match self.timeout.duration() {
            Some(limit) => match timeout(limit, work).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.status.set(TaskStatus::TimedOut);
                    return Err(WorkflowError::Timeout {
                        task_name: self.name.clone(),
                        timeout: limit,
                    });
                }
            },
            None => work.await,
        };
        outcome.map_err(|source| WorkflowError::Execution {
            task_name: self.name.clone(),
            source,
        })
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let state = TaskState {
            status: self.status.get(),
        };
        if let Err(e) = store.save_task_state(self.name.as_str(), state).await {
            warn!("Failed to persist state of task '{}': {}", self.name, e);
        }
    }
}

#[async_trait]
impl Runnable for Task {
    async fn run(&self, ctx: &Context) -> Result<Value, WorkflowError> {
        let mut attempt = 0;

        loop {
            self.status.set(TaskStatus::Running);
            debug!(task = %self.name, attempt, "running task");

            match self.attempt(ctx).await {
                Ok(value) => {
                    ctx.record_output(self.name.as_str(), value.clone());
                    self.status.set(TaskStatus::Completed);
                    info!("Task '{}' completed successfully", self.name);
                    self.persist().await;
                    return Ok(value);
                }
                Err(error) => {
                    self.error_handler.handle_error(&error, ctx).await;

                    if self.retry.should_retry(attempt) {
                        attempt += 1;
                        let delay = self.retry.delay(attempt);
                        let reason = if error.is_timeout() { "timed out" } else { "failed" };
                        self.status.set(TaskStatus::Retrying);
                        info!(
                            "Task '{}' {}, retrying ({}/{}) in {:?}",
                            self.name,
                            reason,
                            attempt,
                            self.retry.max_attempts(),
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    self.status.set(TaskStatus::Failed);
                    warn!(
                        "Task '{}' failed after {} retries: {}",
                        self.name, attempt, error
                    );
                    self.persist().await;
                    return Err(error);
                }
            }
        }
    }

    fn name(&self) -> &TaskName {
        &self.name
    }

    fn status(&self) -> TaskStatus {
        self.status.get()
    }
}
