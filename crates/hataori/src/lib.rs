//! A lightweight task and workflow engine for Rust.
//!
//! Tasks wrap a unit of work with a retry policy and a timeout. A
//! [`Workflow`] runs tasks in order under one shared [`Context`], wraps each
//! one in a [`MiddlewarePipeline`], fires lifecycle hooks, and can be paused,
//! resumed from a persisted checkpoint, or cancelled. Parallel and
//! conditional groups compose tasks; a [`ScheduledTask`] runs one on a cron
//! schedule.
//!
//! # Example
//!
//! ```
//! use hataori::prelude::*;
//! use serde_json::json;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), WorkflowError> {
//! let fetch_users: Arc<dyn Runnable> = Arc::new(Task::from_fn("users", |_ctx| async {
//!     Ok(json!(["ada", "grace"]))
//! }));
//! let fetch_orders: Arc<dyn Runnable> = Arc::new(Task::from_fn("orders", |_ctx| async {
//!     Ok(json!(3))
//! }));
//!
//! let workflow = Workflow::builder()
//!     .name("report")
//!     .retry(RetryPolicy::exponential(3, Duration::from_millis(50)))
//!     .middleware(TracingMiddleware)
//!     .parallel("fetch", vec![fetch_users, fetch_orders])
//!     .step_fn("summarize", |ctx: Context| async move {
//!         let orders = ctx.task_output("orders").unwrap_or_default();
//!         Ok(json!({ "orders": orders }))
//!     })
//!     .build()?;
//!
//! let output = workflow.execute(json!({})).await?;
//! assert_eq!(output["summarize"], json!({ "orders": 3 }));
//! assert_eq!(output["fetch"], json!([["ada", "grace"], 3]));
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod composite;
pub mod config;
pub mod events;
pub mod hooks;
pub mod logging;
pub mod manager;
pub mod middleware;
pub mod scheduled;
pub mod store;
pub mod task;
pub mod trigger;
pub mod workflow;

// Re-export core types
pub use hataori_core::*;

pub use builder::WorkflowBuilder;
pub use composite::{ConditionalTask, ParallelTask};
pub use config::{BackoffConfig, TaskOptions};
pub use events::{EventBus, ListenerId};
pub use hooks::{Hook, HookEvent, HookManager};
pub use logging::{LogLevel, Logger, LoggingErrorHandler};
pub use manager::WorkflowManager;
pub use middleware::{Middleware, MiddlewarePipeline, Next, TracingMiddleware};
pub use scheduled::ScheduledTask;
pub use store::{JsonFileStateStore, MemoryStateStore};
pub use task::Task;
pub use trigger::{CronTrigger, Trigger, TriggerHandle};
pub use workflow::{Workflow, WorkflowController};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        BackoffStrategy, ConditionalTask, Context, ContextKey, ErrorHandler, HookEvent, HookType,
        MiddlewarePipeline, ParallelTask, RetryPolicy, Runnable, ScheduledTask, StateStore, Task,
        TaskName, TaskStatus, TimeoutPolicy, TracingMiddleware, Work, Workflow, WorkflowBuilder,
        WorkflowController, WorkflowError, WorkflowState, WorkflowStatus,
    };
}
