//! Core traits and types for the hataori workflow engine.
//!
//! This crate provides the runtime-free abstractions. Library authors should
//! depend on this crate to implement custom units of work, stores or error
//! handlers.
//!
//! # Core Types
//!
//! - [`Runnable`] - Anything a workflow can step through
//! - [`Work`] - The unit of work wrapped by a task
//! - [`Context`] - Input, output, scratch data and per-task outputs
//! - [`WorkflowError`] - Error types for task and workflow execution
//! - [`RetryPolicy`], [`BackoffStrategy`], [`TimeoutPolicy`] - Per-task policies
//!
//! # Collaborators
//!
//! - [`ErrorHandler`] - Receives every caught failure
//! - [`StateStore`] - Persists workflow and task checkpoints

mod context;
mod error;
mod policy;
mod state;
mod task;
mod traits;

pub use context::{Context, ContextKey};
pub use error::{BoxError, HookType, WorkflowError};
pub use policy::{BackoffStrategy, RetryPolicy, TimeoutPolicy};
pub use state::{TaskState, WorkflowState, WorkflowStatus};
pub use task::{FnWork, Runnable, TaskName, TaskStatus, Work};
pub use traits::{ErrorHandler, StateStore};
