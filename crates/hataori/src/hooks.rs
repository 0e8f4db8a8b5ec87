//! Lifecycle hooks fired at workflow and task boundaries.

use async_trait::async_trait;
use futures::future::join_all;
use hataori_core::{Context, HookType, TaskName, WorkflowError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A lifecycle event together with its payload.
#[derive(Debug, Clone, Copy)]
pub enum HookEvent<'a> {
    /// The workflow is about to run its first task.
    WorkflowStart {
        /// The workflow context.
        context: &'a Context,
    },
    /// A task is about to run.
    TaskStart {
        /// The workflow context.
        context: &'a Context,
        /// The task about to run.
        task: &'a TaskName,
    },
    /// A task finished successfully.
    TaskFinish {
        /// The workflow context.
        context: &'a Context,
        /// The task that finished.
        task: &'a TaskName,
    },
    /// Every task finished.
    AllTasksFinish {
        /// The workflow context.
        context: &'a Context,
    },
    /// The workflow is completing.
    WorkflowFinish {
        /// The workflow context.
        context: &'a Context,
    },
    /// The workflow failed.
    WorkflowError {
        /// The workflow context.
        context: &'a Context,
        /// The failure.
        error: &'a WorkflowError,
    },
}

impl<'a> HookEvent<'a> {
    /// Returns the registration key of this event.
    pub fn hook_type(&self) -> HookType {
        match self {
            HookEvent::WorkflowStart { .. } => HookType::OnWorkflowStart,
            HookEvent::TaskStart { .. } => HookType::OnTaskStart,
            HookEvent::TaskFinish { .. } => HookType::OnTaskFinish,
            HookEvent::AllTasksFinish { .. } => HookType::OnAllTasksFinish,
            HookEvent::WorkflowFinish { .. } => HookType::OnWorkflowFinish,
            HookEvent::WorkflowError { .. } => HookType::OnWorkflowError,
        }
    }

    /// Returns the workflow context.
    pub fn context(&self) -> &'a Context {
        match *self {
            HookEvent::WorkflowStart { context }
            | HookEvent::TaskStart { context, .. }
            | HookEvent::TaskFinish { context, .. }
            | HookEvent::AllTasksFinish { context }
            | HookEvent::WorkflowFinish { context }
            | HookEvent::WorkflowError { context, .. } => context,
        }
    }

    /// Returns the task for task-level events.
    pub fn task(&self) -> Option<&'a TaskName> {
        match *self {
            HookEvent::TaskStart { task, .. } | HookEvent::TaskFinish { task, .. } => Some(task),
            _ => None,
        }
    }

    /// Returns the failure for [`HookEvent::WorkflowError`].
    pub fn error(&self) -> Option<&'a WorkflowError> {
        match *self {
            HookEvent::WorkflowError { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// A lifecycle callback.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Handles one event.
    async fn call(&self, event: &HookEvent<'_>) -> Result<(), WorkflowError>;
}

/// Adapts a synchronous closure into a [`Hook`].
pub struct FnHook<F>(F);

impl<F> FnHook<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&HookEvent<'_>) -> Result<(), WorkflowError> + Send + Sync,
{
    async fn call(&self, event: &HookEvent<'_>) -> Result<(), WorkflowError> {
        (self.0)(event)
    }
}

/// Wraps a closure as a shareable hook.
///
/// ```
/// use hataori::hooks::{hook_fn, HookEvent};
///
/// let hook = hook_fn(|event: &HookEvent<'_>| {
///     println!("{}", event.hook_type());
///     Ok(())
/// });
/// # drop(hook);
/// ```
pub fn hook_fn<F>(f: F) -> Arc<dyn Hook>
where
    F: Fn(&HookEvent<'_>) -> Result<(), WorkflowError> + Send + Sync + 'static,
{
    Arc::new(FnHook::new(f))
}

/// Registry of hooks keyed by lifecycle event.
///
/// Hooks registered under one event run concurrently. Every hook is awaited
/// even when a sibling fails; if any failed, the first failure in
/// registration order is returned.
#[derive(Clone, Default)]
pub struct HookManager {
    hooks: HashMap<HookType, Vec<Arc<dyn Hook>>>,
}

impl fmt::Debug for HookManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<HookType, usize> =
            self.hooks.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("HookManager").field("hooks", &counts).finish()
    }
}

impl HookManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    /// Appends a hook for `hook_type`.
    pub fn register(&mut self, hook_type: HookType, hook: Arc<dyn Hook>) {
        self.hooks.entry(hook_type).or_default().push(hook);
    }

    /// Returns the number of hooks registered for `hook_type`.
    pub fn len(&self, hook_type: HookType) -> usize {
        self.hooks.get(&hook_type).map_or(0, Vec::len)
    }

    /// Returns `true` if no hook is registered at all.
    pub fn is_empty(&self) -> bool {
        self.hooks.values().all(Vec::is_empty)
    }

    /// Removes every registered hook.
    pub fn clear(&mut self) {
        self.hooks.clear();
    }

    /// Runs all hooks registered for the event.
    pub async fn execute_hooks(&self, event: HookEvent<'_>) -> Result<(), WorkflowError> {
        let hook_type = event.hook_type();
        let Some(hooks) = self.hooks.get(&hook_type) else {
            return Ok(());
        };

        let results = join_all(hooks.iter().map(|hook| hook.call(&event))).await;
        match results.into_iter().find_map(Result::err) {
            None => Ok(()),
            Some(error @ WorkflowError::HookError { .. }) => Err(error),
            Some(error) => Err(WorkflowError::HookError {
                hook_type,
                details: error.to_string(),
            }),
        }
    }
}
