//! Task naming, status and the runnable/work traits.

use crate::context::Context;
use crate::error::{BoxError, WorkflowError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Debug};
use std::future::Future;

/// Type-safe task name wrapper.
///
/// Names are used as the key of a task's recorded output, so they only need
/// to be unique within one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskName(String);

impl TaskName {
    /// Creates a new TaskName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the task name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&TaskName> for TaskName {
    fn from(name: &TaskName) -> Self {
        name.clone()
    }
}

impl AsRef<str> for TaskName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for TaskName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for TaskName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TaskName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Execution status of a task.
///
/// `Pending → Running → {Completed | Retrying → Running | Failed | TimedOut}`.
/// `TimedOut` is transient: a timed out attempt is folded into the retry or
/// failure path right after it is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Never run.
    #[default]
    Pending,
    /// An attempt is in flight.
    Running,
    /// Waiting out the backoff delay before the next attempt.
    Retrying,
    /// The last attempt succeeded.
    Completed,
    /// Retries exhausted.
    Failed,
    /// The last attempt exceeded its timeout.
    #[serde(rename = "timedout")]
    TimedOut,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timedout",
        };
        f.write_str(s)
    }
}

/// Anything a workflow can step through.
///
/// Plain tasks and every composite (parallel, conditional, scheduled)
/// implement this independently; retry and timeout handling live in the
/// policies each implementation chooses to apply.
#[async_trait]
pub trait Runnable: Send + Sync + Debug {
    /// Runs against the shared context and returns this unit's result.
    async fn run(&self, ctx: &Context) -> Result<Value, WorkflowError>;

    /// Returns the name the result is recorded under.
    fn name(&self) -> &TaskName;

    /// Returns the status left by the most recent `run`.
    fn status(&self) -> TaskStatus;
}

/// The unit of work wrapped by a task.
///
/// # Examples
///
/// ```
/// use hataori_core::{BoxError, Context, Work};
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
///
/// struct Double;
///
/// #[async_trait]
/// impl Work for Double {
///     async fn execute(&self, ctx: &Context) -> Result<Value, BoxError> {
///         let n = ctx.input().as_i64().ok_or("input must be a number")?;
///         Ok(json!(n * 2))
///     }
/// }
/// ```
#[async_trait]
pub trait Work: Send + Sync {
    /// Performs the work. Errors are retried according to the task's policy.
    async fn execute(&self, ctx: &Context) -> Result<Value, BoxError>;
}

/// Adapts a closure returning a future into [`Work`].
///
/// The closure receives a clone of the context handle.
pub struct FnWork<F>(F);

impl<F> FnWork<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Debug for FnWork<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWork").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Work for FnWork<F>
where
    F: Fn(Context) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, BoxError>> + Send,
{
    async fn execute(&self, ctx: &Context) -> Result<Value, BoxError> {
        (self.0)(ctx.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_name() {
        let name = TaskName::new("test");
        assert_eq!(name.as_str(), "test");

        let name: TaskName = "test".into();
        assert_eq!(name, "test");
    }

    #[test]
    fn test_task_status_serde() {
        assert_eq!(
            serde_json::to_value(TaskStatus::TimedOut).unwrap(),
            json!("timedout")
        );
        let status: TaskStatus = serde_json::from_value(json!("retrying")).unwrap();
        assert_eq!(status, TaskStatus::Retrying);
        assert_eq!(TaskStatus::default(), TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_fn_work_receives_context() {
        let work = FnWork::new(|ctx: Context| async move {
            let n = ctx.input().as_i64().unwrap_or_default();
            Ok::<_, BoxError>(json!(n + 1))
        });

        let ctx = Context::new(json!(41));
        let value = work.execute(&ctx).await.unwrap();
        assert_eq!(value, json!(42));
    }
}
