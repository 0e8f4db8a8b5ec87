//! Tasks made of other tasks: fan-out and guarded groups.

use crate::middleware::MiddlewarePipeline;
use crate::task::StatusCell;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use hataori_core::{Context, Runnable, TaskName, TaskStatus, WorkflowError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Predicate deciding whether a [`ConditionalTask`] runs its children.
pub type Predicate = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Runs its children concurrently against the same context.
///
/// Each child is spawned on the tokio runtime and wrapped in the pipeline.
/// Results come back in the order the children were given, whatever order
/// they finish in. The first failure is returned as soon as it is observed;
/// siblings that are still running are detached and finish in the
/// background rather than being aborted.
pub struct ParallelTask {
    name: TaskName,
    children: Vec<Arc<dyn Runnable>>,
    pipeline: Arc<MiddlewarePipeline>,
    status: StatusCell,
}

impl fmt::Debug for ParallelTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelTask")
            .field("name", &self.name)
            .field("children", &self.children)
            .field("status", &self.status.get())
            .finish()
    }
}

impl ParallelTask {
    /// Creates a parallel group with an empty middleware pipeline.
    pub fn new(name: impl Into<TaskName>, children: Vec<Arc<dyn Runnable>>) -> Self {
        Self {
            name: name.into(),
            children,
            pipeline: Arc::new(MiddlewarePipeline::new()),
            status: StatusCell::default(),
        }
    }

    /// Wraps every child in `pipeline`.
    pub fn with_pipeline(mut self, pipeline: Arc<MiddlewarePipeline>) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Returns the children in execution order.
    pub fn children(&self) -> &[Arc<dyn Runnable>] {
        &self.children
    }
}

#[async_trait]
impl Runnable for ParallelTask {
    async fn run(&self, ctx: &Context) -> Result<Value, WorkflowError> {
        self.status.set(TaskStatus::Running);
        debug!(task = %self.name, children = self.children.len(), "fanning out");

        let mut pending: FuturesUnordered<_> = self
            .children
            .iter()
            .enumerate()
            .map(|(index, child)| {
                let child = Arc::clone(child);
                let pipeline = Arc::clone(&self.pipeline);
                let child_ctx = ctx.clone();
                let child_name = child.name().clone();
                let handle =
                    tokio::spawn(async move { pipeline.run(child.as_ref(), &child_ctx).await });
                async move { (index, child_name, handle.await) }
            })
            .collect();

        let mut results = vec![Value::Null; self.children.len()];
        while let Some((index, child_name, joined)) = pending.next().await {
            let outcome = joined
                .map_err(|e| WorkflowError::execution(child_name, e))
                .and_then(|result| result);
            match outcome {
                Ok(value) => results[index] = value,
                Err(error) => {
                    self.status.set(TaskStatus::Failed);
                    warn!(
                        "Parallel task '{}' failed, {} children left running: {}",
                        self.name,
                        pending.len(),
                        error
                    );
                    return Err(error);
                }
            }
        }

        let value = Value::Array(results);
        ctx.record_output(self.name.as_str(), value.clone());
        self.status.set(TaskStatus::Completed);
        info!("Task '{}' completed successfully", self.name);
        Ok(value)
    }

    fn name(&self) -> &TaskName {
        &self.name
    }

    fn status(&self) -> TaskStatus {
        self.status.get()
    }
}

/// Runs its children one after another, but only if a predicate holds.
///
/// The predicate is evaluated once per `run`. When it is false the task
/// returns `Value::Null` without recording anything or invoking a child.
pub struct ConditionalTask {
    name: TaskName,
    predicate: Predicate,
    children: Vec<Arc<dyn Runnable>>,
    pipeline: Arc<MiddlewarePipeline>,
    status: StatusCell,
}

impl fmt::Debug for ConditionalTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalTask")
            .field("name", &self.name)
            .field("children", &self.children)
            .field("status", &self.status.get())
            .finish_non_exhaustive()
    }
}

impl ConditionalTask {
    /// Creates a guarded group with an empty middleware pipeline.
    pub fn new<P>(name: impl Into<TaskName>, predicate: P, children: Vec<Arc<dyn Runnable>>) -> Self
    where
        P: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        Self::from_shared(name, Arc::new(predicate), children)
    }

    /// Creates a guarded group around an already shared predicate.
    pub fn from_shared(
        name: impl Into<TaskName>,
        predicate: Predicate,
        children: Vec<Arc<dyn Runnable>>,
    ) -> Self {
        Self {
            name: name.into(),
            predicate,
            children,
            pipeline: Arc::new(MiddlewarePipeline::new()),
            status: StatusCell::default(),
        }
    }

    /// Wraps every child in `pipeline`.
    pub fn with_pipeline(mut self, pipeline: Arc<MiddlewarePipeline>) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Returns the children in execution order.
    pub fn children(&self) -> &[Arc<dyn Runnable>] {
        &self.children
    }
}

#[async_trait]
impl Runnable for ConditionalTask {
    async fn run(&self, ctx: &Context) -> Result<Value, WorkflowError> {
        self.status.set(TaskStatus::Running);

        if !(self.predicate)(ctx) {
            debug!(task = %self.name, "condition not met, skipping children");
            self.status.set(TaskStatus::Completed);
            return Ok(Value::Null);
        }

        let mut results = Vec::with_capacity(self.children.len());
        for child in &self.children {
            match self.pipeline.run(child.as_ref(), ctx).await {
                Ok(value) => results.push(value),
                Err(error) => {
                    self.status.set(TaskStatus::Failed);
                    return Err(error);
                }
            }
        }

        let value = Value::Array(results);
        ctx.record_output(self.name.as_str(), value.clone());
        self.status.set(TaskStatus::Completed);
        info!("Task '{}' completed successfully", self.name);
        Ok(value)
    }

    fn name(&self) -> &TaskName {
        &self.name
    }

    fn status(&self) -> TaskStatus {
        self.status.get()
    }
}
