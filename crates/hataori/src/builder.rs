//! Fluent construction of workflows.

use crate::composite::{ConditionalTask, ParallelTask, Predicate};
use crate::config::TaskOptions;
use crate::events::EventBus;
use crate::hooks::{hook_fn, Hook, HookEvent, HookManager};
use crate::logging::LoggingErrorHandler;
use crate::middleware::{Middleware, MiddlewarePipeline};
use crate::task::Task;
use crate::workflow::{Validator, Workflow, WorkflowController};
use hataori_core::{
    BoxError, Context, ErrorHandler, FnWork, HookType, RetryPolicy, Runnable, StateStore,
    TaskName, TimeoutPolicy, Work, WorkflowError,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

enum Entry {
    Ready(Arc<dyn Runnable>),
    Step {
        name: TaskName,
        work: Arc<dyn Work>,
    },
    Parallel {
        name: TaskName,
        children: Vec<Arc<dyn Runnable>>,
    },
    Conditional {
        name: TaskName,
        predicate: Predicate,
        children: Vec<Arc<dyn Runnable>>,
    },
}

/// Builder for constructing [`Workflow`] instances.
///
/// Tasks added with [`step`](Self::step) or [`step_fn`](Self::step_fn) get
/// the builder's retry, timeout, error handler and state store. Parallel and
/// conditional groups are created at [`build`](Self::build) time, so they
/// see every middleware registered, wherever it was added in the chain.
pub struct WorkflowBuilder {
    name: Option<String>,
    entries: Vec<Entry>,
    middleware: MiddlewarePipeline,
    hooks: HookManager,
    retry: RetryPolicy,
    timeout: TimeoutPolicy,
    error_handler: Arc<dyn ErrorHandler>,
    store: Option<Arc<dyn StateStore>>,
    validator: Option<Validator>,
    events: Option<EventBus>,
    controller: WorkflowController,
    deferred: Option<WorkflowError>,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowBuilder {
    /// Creates a new empty workflow builder.
    pub fn new() -> Self {
        Self {
            name: None,
            entries: Vec::new(),
            middleware: MiddlewarePipeline::new(),
            hooks: HookManager::new(),
            retry: RetryPolicy::none(),
            timeout: TimeoutPolicy::default(),
            error_handler: Arc::new(LoggingErrorHandler),
            store: None,
            validator: None,
            events: None,
            controller: WorkflowController::new(),
            deferred: None,
        }
    }

    /// Sets the workflow name. Required.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Appends a ready-made task.
    pub fn task<R: Runnable + 'static>(self, task: R) -> Self {
        self.task_arc(Arc::new(task))
    }

    /// Appends a shared task.
    pub fn task_arc(mut self, task: Arc<dyn Runnable>) -> Self {
        self.entries.push(Entry::Ready(task));
        self
    }

    /// Appends a task around `work`, configured with the builder defaults.
    pub fn step<W: Work + 'static>(mut self, name: impl Into<TaskName>, work: W) -> Self {
        self.entries.push(Entry::Step {
            name: name.into(),
            work: Arc::new(work),
        });
        self
    }

    /// Appends a task around a closure, configured with the builder defaults.
    pub fn step_fn<F, Fut>(self, name: impl Into<TaskName>, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        self.step(name, FnWork::new(f))
    }

    /// Appends a group whose children run concurrently.
    pub fn parallel(mut self, name: impl Into<TaskName>, children: Vec<Arc<dyn Runnable>>) -> Self {
        self.entries.push(Entry::Parallel {
            name: name.into(),
            children,
        });
        self
    }

    /// Appends a group whose children run in order when `predicate` holds.
    pub fn conditional<P>(
        mut self,
        name: impl Into<TaskName>,
        predicate: P,
        children: Vec<Arc<dyn Runnable>>,
    ) -> Self
    where
        P: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.entries.push(Entry::Conditional {
            name: name.into(),
            predicate: Arc::new(predicate),
            children,
        });
        self
    }

    /// Registers a hook.
    pub fn hook(mut self, hook_type: HookType, hook: Arc<dyn Hook>) -> Self {
        self.hooks.register(hook_type, hook);
        self
    }

    /// Registers a synchronous closure as a hook.
    pub fn on<F>(self, hook_type: HookType, f: F) -> Self
    where
        F: Fn(&HookEvent<'_>) -> Result<(), WorkflowError> + Send + Sync + 'static,
    {
        self.hook(hook_type, hook_fn(f))
    }

    /// Appends a middleware. The first one added is the outermost.
    pub fn middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Sets retry, timeout and backoff defaults from `options`.
    ///
    /// Invalid options are reported by [`build`](Self::build).
    pub fn options(mut self, options: TaskOptions) -> Self {
        match options.into_policies() {
            Ok((retry, timeout)) => {
                self.retry = retry;
                self.timeout = timeout;
            }
            Err(e) => {
                if self.deferred.is_none() {
                    self.deferred = Some(e);
                }
            }
        }
        self
    }

    /// Sets the default retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the default per-attempt timeout. `Duration::ZERO` disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = TimeoutPolicy::new(timeout);
        self
    }

    /// Sets the error handler of the workflow and of its builder-made tasks.
    pub fn error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    /// Persists checkpoints, and the state of builder-made tasks, to `store`.
    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Emits lifecycle events on `bus`.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Validates the input of every `execute`.
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> Vec<String> + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Uses an existing controller, e.g. one already handed to a task.
    pub fn controller(mut self, controller: WorkflowController) -> Self {
        self.controller = controller;
        self
    }

    /// Builds the workflow.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Configuration`] if no name was set or if
    /// [`options`](Self::options) were invalid.
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        let name = self.name.ok_or_else(|| {
            WorkflowError::Configuration("Workflow name must be specified".to_string())
        })?;
        if let Some(error) = self.deferred {
            return Err(error);
        }

        let pipeline = Arc::new(self.middleware);
        let tasks = self
            .entries
            .into_iter()
            .map(|entry| -> Arc<dyn Runnable> {
                match entry {
                    Entry::Ready(task) => task,
                    Entry::Step { name, work } => {
                        let mut task = Task::from_shared(name, work)
                            .with_retry(self.retry)
                            .with_timeout_policy(self.timeout)
                            .with_error_handler(Arc::clone(&self.error_handler));
                        if let Some(store) = &self.store {
                            task = task.with_state_store(Arc::clone(store));
                        }
                        Arc::new(task)
                    }
                    Entry::Parallel { name, children } => Arc::new(
                        ParallelTask::new(name, children).with_pipeline(Arc::clone(&pipeline)),
                    ),
                    Entry::Conditional {
                        name,
                        predicate,
                        children,
                    } => Arc::new(
                        ConditionalTask::from_shared(name, predicate, children)
                            .with_pipeline(Arc::clone(&pipeline)),
                    ),
                }
            })
            .collect();

        Ok(Workflow::assemble(
            name,
            tasks,
            pipeline,
            self.hooks,
            self.error_handler,
            self.store,
            self.validator,
            self.events,
            self.controller,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffConfig;
    use hataori_core::TaskStatus;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_build_requires_name() {
        let result = WorkflowBuilder::new()
            .step_fn("a", |_ctx| async { Ok(Value::Null) })
            .build();

        match result {
            Err(WorkflowError::Configuration(message)) => {
                assert_eq!(message, "Workflow name must be specified")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_options_reported_at_build() {
        let options = TaskOptions {
            backoff: BackoffConfig {
                strategy: "quadratic".to_string(),
                ..BackoffConfig::default()
            },
            ..TaskOptions::default()
        };
        let result = Workflow::builder().name("wf").options(options).build();
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_steps_get_builder_defaults() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let workflow = Workflow::builder()
            .name("wf")
            .retry(RetryPolicy::fixed(2, Duration::from_millis(1)))
            .step_fn("flaky", move |_ctx| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("not yet".into())
                    } else {
                        Ok(json!("ok"))
                    }
                }
            })
            .build()
            .unwrap();

        let output = workflow.execute(Value::Null).await.unwrap();

        assert_eq!(output, json!({ "flaky": "ok" }));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(workflow.tasks_status()[0].1, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_groups_see_later_middleware() {
        struct Tag(Arc<AtomicU32>);

        #[async_trait::async_trait]
        impl Middleware for Tag {
            async fn handle<'a>(
                &'a self,
                _task: &'a TaskName,
                _ctx: &'a Context,
                next: crate::middleware::Next<'a>,
            ) -> Result<Value, WorkflowError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                next().await
            }
        }

        let calls = Arc::new(AtomicU32::new(0));
        let child: Arc<dyn Runnable> =
            Arc::new(Task::from_fn("child", |_ctx| async { Ok(json!(1)) }));
        let workflow = Workflow::builder()
            .name("wf")
            .parallel("group", vec![child])
            .middleware(Tag(Arc::clone(&calls)))
            .build()
            .unwrap();

        workflow.execute(Value::Null).await.unwrap();

        // Once around the group, once around its child.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
