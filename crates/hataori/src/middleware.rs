//! Middleware wrapped around every task invocation.

use async_trait::async_trait;
use futures::future::BoxFuture;
use hataori_core::{Context, Runnable, TaskName, WorkflowError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Continuation handed to a middleware. Calling it runs the rest of the
/// chain and, at the end of it, the task itself.
pub type Next<'a> = Box<dyn FnOnce() -> BoxFuture<'a, Result<Value, WorkflowError>> + Send + 'a>;

/// Logic that runs before and after a task.
///
/// A middleware that returns without calling `next` skips the task; its own
/// return value becomes the result.
///
/// # Examples
///
/// ```
/// use hataori::middleware::{Middleware, Next};
/// use hataori::prelude::*;
/// use async_trait::async_trait;
/// use serde_json::Value;
///
/// struct SkipWhenDryRun;
///
/// #[async_trait]
/// impl Middleware for SkipWhenDryRun {
///     async fn handle<'a>(
///         &'a self,
///         _task: &'a TaskName,
///         ctx: &'a Context,
///         next: Next<'a>,
///     ) -> Result<Value, WorkflowError> {
///         if ctx.contains_key("dry_run") {
///             return Ok(Value::Null);
///         }
///         next().await
///     }
/// }
/// ```
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Wraps one invocation of `task`.
    async fn handle<'a>(
        &'a self,
        task: &'a TaskName,
        ctx: &'a Context,
        next: Next<'a>,
    ) -> Result<Value, WorkflowError>;
}

/// Ordered middleware chain. The first entry is the outermost wrapper.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    layers: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl MiddlewarePipeline {
    /// Creates an empty pipeline.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Appends a middleware; it runs inside every one added before it.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.layers.push(middleware);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.push(Arc::new(middleware));
        self
    }

    /// Returns the number of middleware.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Returns `true` if there is no middleware.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Runs `task` through the whole chain.
    pub async fn run(&self, task: &dyn Runnable, ctx: &Context) -> Result<Value, WorkflowError> {
        self.dispatch(0, task, ctx).await
    }

    fn dispatch<'a>(
        &'a self,
        index: usize,
        task: &'a dyn Runnable,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<Value, WorkflowError>> {
        match self.layers.get(index) {
            Some(layer) => {
                let next: Next<'a> = Box::new(move || self.dispatch(index + 1, task, ctx));
                layer.handle(task.name(), ctx, next)
            }
            None => task.run(ctx),
        }
    }
}

/// Logs the start, outcome and duration of every task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMiddleware;

#[async_trait]
impl Middleware for TracingMiddleware {
    async fn handle<'a>(
        &'a self,
        task: &'a TaskName,
        _ctx: &'a Context,
        next: Next<'a>,
    ) -> Result<Value, WorkflowError> {
        let started = Instant::now();
        debug!(task = %task, "task starting");
        let result = next().await;
        match &result {
            Ok(_) => info!(task = %task, elapsed = ?started.elapsed(), "task finished"),
            Err(e) => warn!(task = %task, elapsed = ?started.elapsed(), "task failed: {}", e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn handle<'a>(
            &'a self,
            _task: &'a TaskName,
            _ctx: &'a Context,
            next: Next<'a>,
        ) -> Result<Value, WorkflowError> {
            self.log.lock().push(format!("{}:before", self.label));
            let result = next().await;
            self.log.lock().push(format!("{}:after", self.label));
            result
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl Middleware for ShortCircuit {
        async fn handle<'a>(
            &'a self,
            _task: &'a TaskName,
            _ctx: &'a Context,
            _next: Next<'a>,
        ) -> Result<Value, WorkflowError> {
            Ok(json!("skipped"))
        }
    }

    #[tokio::test]
    async fn test_first_middleware_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = MiddlewarePipeline::new()
            .with(Recorder {
                label: "outer",
                log: Arc::clone(&log),
            })
            .with(Recorder {
                label: "inner",
                log: Arc::clone(&log),
            });

        let task_log = Arc::clone(&log);
        let task = Task::from_fn("t", move |_ctx| {
            let task_log = Arc::clone(&task_log);
            async move {
                task_log.lock().push("task".to_string());
                Ok(json!(1))
            }
        });

        let value = pipeline.run(&task, &Context::default()).await.unwrap();

        assert_eq!(value, json!(1));
        assert_eq!(
            *log.lock(),
            vec!["outer:before", "inner:before", "task", "inner:after", "outer:after"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_task() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let task = Task::from_fn("t", move |_ctx| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
                Ok(Value::Null)
            }
        });

        let pipeline = MiddlewarePipeline::new().with(ShortCircuit);
        let ctx = Context::default();
        let value = pipeline.run(&task, &ctx).await.unwrap();

        assert_eq!(value, json!("skipped"));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(ctx.task_output("t"), None);
    }

    #[tokio::test]
    async fn test_empty_pipeline_runs_task() {
        let pipeline = MiddlewarePipeline::new().with(TracingMiddleware);
        assert_eq!(pipeline.len(), 1);

        let task = Task::from_fn("t", |_ctx| async { Ok(json!("ok")) });
        let value = MiddlewarePipeline::default()
            .run(&task, &Context::default())
            .await
            .unwrap();
        assert_eq!(value, json!("ok"));
    }
}
