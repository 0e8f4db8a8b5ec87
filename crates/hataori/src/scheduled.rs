//! A task fired by a recurring trigger.

use crate::task::Task;
use crate::trigger::{CronTrigger, Trigger, TriggerCallback, TriggerHandle};
use async_trait::async_trait;
use futures::FutureExt;
use hataori_core::{Context, Runnable, TaskName, TaskStatus, WorkflowError};
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A [`Task`] plus a recurring trigger.
///
/// Every firing runs the task against a fresh context with a null input.
/// Changing the expression with [`schedule`](Self::schedule) takes effect on
/// the next [`start`](Self::start); an armed trigger keeps its expression.
pub struct ScheduledTask {
    task: Arc<Task>,
    trigger: Arc<dyn Trigger>,
    expression: Mutex<String>,
    armed: Mutex<Option<TriggerHandle>>,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expression = self.expression();
        f.debug_struct("ScheduledTask")
            .field("task", &self.task)
            .field("trigger", &self.trigger)
            .field("expression", &expression)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ScheduledTask {
    /// Creates a scheduled task.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Configuration`] if the trigger rejects
    /// `expression`.
    pub fn new(
        task: Task,
        expression: impl Into<String>,
        trigger: Arc<dyn Trigger>,
    ) -> Result<Self, WorkflowError> {
        let expression = expression.into();
        trigger.validate(&expression)?;
        Ok(Self {
            task: Arc::new(task),
            trigger,
            expression: Mutex::new(expression),
            armed: Mutex::new(None),
        })
    }

    /// Creates a scheduled task driven by a [`CronTrigger`].
    pub fn with_cron(task: Task, expression: impl Into<String>) -> Result<Self, WorkflowError> {
        Self::new(task, expression, Arc::new(CronTrigger::new()))
    }

    /// Arms the trigger. Does nothing if already started.
    pub fn start(&self) -> Result<(), WorkflowError> {
        // Never lock `expression` while holding `armed`.
        let expression = self.expression();
        let mut armed = self.armed.lock();
        if armed.is_some() {
            warn!("Scheduled task '{}' is already started", self.task.name());
            return Ok(());
        }

        let task = Arc::clone(&self.task);
        let callback: TriggerCallback = Arc::new(move || {
            let task = Arc::clone(&task);
            async move {
                let ctx = Context::new(Value::Null);
                if let Err(e) = task.run(&ctx).await {
                    error!("Scheduled run of task '{}' failed: {}", task.name(), e);
                }
            }
            .boxed()
        });

        *armed = Some(self.trigger.arm(&expression, callback)?);
        info!("Scheduled task '{}' started ({})", self.task.name(), expression);
        Ok(())
    }

    /// Disarms the trigger. Does nothing if not started.
    pub fn stop(&self) {
        match self.armed.lock().take() {
            Some(handle) => {
                handle.stop();
                info!("Scheduled task '{}' stopped", self.task.name());
            }
            None => warn!("Scheduled task '{}' is not started", self.task.name()),
        }
    }

    /// Replaces the expression used by the next [`start`](Self::start).
    pub fn schedule(&self, expression: impl Into<String>) -> Result<(), WorkflowError> {
        let expression = expression.into();
        self.trigger.validate(&expression)?;
        *self.expression.lock() = expression;
        Ok(())
    }

    /// Returns the stored expression.
    pub fn expression(&self) -> String {
        self.expression.lock().clone()
    }

    /// Returns `true` while the trigger is armed.
    pub fn is_running(&self) -> bool {
        self.armed.lock().is_some()
    }

    /// Returns the wrapped task.
    pub fn task(&self) -> &Task {
        &self.task
    }
}

#[async_trait]
impl Runnable for ScheduledTask {
    async fn run(&self, ctx: &Context) -> Result<Value, WorkflowError> {
        self.task.run(ctx).await
    }

    fn name(&self) -> &TaskName {
        self.task.name()
    }

    fn status(&self) -> TaskStatus {
        self.task.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Trigger fired by hand, remembering what it was armed with.
    #[derive(Default)]
    struct ManualTrigger {
        armed: Mutex<Vec<String>>,
        callback: Arc<Mutex<Option<TriggerCallback>>>,
    }

    impl ManualTrigger {
        async fn fire(&self) {
            let callback = self.callback.lock().clone();
            if let Some(callback) = callback {
                callback().await;
            }
        }
    }

    impl fmt::Debug for ManualTrigger {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ManualTrigger")
                .field("armed", &*self.armed.lock())
                .finish_non_exhaustive()
        }
    }

    impl Trigger for ManualTrigger {
        fn validate(&self, expression: &str) -> Result<(), WorkflowError> {
            if expression.is_empty() {
                return Err(WorkflowError::Configuration("empty schedule".to_string()));
            }
            Ok(())
        }

        fn arm(
            &self,
            expression: &str,
            callback: TriggerCallback,
        ) -> Result<TriggerHandle, WorkflowError> {
            self.armed.lock().push(expression.to_string());
            *self.callback.lock() = Some(callback);
            let slot = Arc::clone(&self.callback);
            Ok(TriggerHandle::new(move || {
                slot.lock().take();
            }))
        }
    }

    fn counting_task(runs: Arc<AtomicU32>) -> Task {
        Task::from_fn("tick", move |ctx| {
            let runs = Arc::clone(&runs);
            async move {
                assert_eq!(ctx.input(), &Value::Null);
                Ok(Value::from(runs.fetch_add(1, Ordering::SeqCst) + 1))
            }
        })
    }

    #[tokio::test]
    async fn test_each_firing_runs_task() {
        let runs = Arc::new(AtomicU32::new(0));
        let trigger = Arc::new(ManualTrigger::default());
        let scheduled =
            ScheduledTask::new(counting_task(Arc::clone(&runs)), "every", trigger.clone()).unwrap();

        scheduled.start().unwrap();
        assert!(scheduled.is_running());

        trigger.fire().await;
        trigger.fire().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(scheduled.status(), TaskStatus::Completed);

        scheduled.stop();
        assert!(!scheduled.is_running());
        trigger.fire().await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_when_idle_are_noops() {
        let trigger = Arc::new(ManualTrigger::default());
        let scheduled =
            ScheduledTask::new(counting_task(Arc::default()), "every", trigger.clone()).unwrap();

        scheduled.stop();
        scheduled.start().unwrap();
        scheduled.start().unwrap();

        assert_eq!(trigger.armed.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_reschedule_applies_on_next_start() {
        let trigger = Arc::new(ManualTrigger::default());
        let scheduled =
            ScheduledTask::new(counting_task(Arc::default()), "first", trigger.clone()).unwrap();

        scheduled.start().unwrap();
        scheduled.schedule("second").unwrap();
        assert_eq!(*trigger.armed.lock(), vec!["first".to_string()]);

        scheduled.stop();
        scheduled.start().unwrap();
        assert_eq!(
            *trigger.armed.lock(),
            vec!["first".to_string(), "second".to_string()]
        );
        assert!(scheduled.schedule("").is_err());
        assert_eq!(scheduled.expression(), "second");
    }

    #[test]
    fn test_locks_taken_one_at_a_time() {
        let scheduled = Arc::new(
            ScheduledTask::new(
                counting_task(Arc::default()),
                "every",
                Arc::new(ManualTrigger::default()),
            )
            .unwrap(),
        );

        // A start blocked on the expression must not hold the handle slot.
        let expression = scheduled.expression.lock();
        let starter = {
            let scheduled = Arc::clone(&scheduled);
            std::thread::spawn(move || scheduled.start())
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!scheduled.is_running());
        drop(expression);
        starter.join().unwrap().unwrap();
        assert!(scheduled.is_running());

        // Formatting blocked on the handle slot must not hold the expression.
        let armed = scheduled.armed.lock();
        let formatter = {
            let scheduled = Arc::clone(&scheduled);
            std::thread::spawn(move || format!("{:?}", scheduled))
        };
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(*scheduled.expression.lock(), "every");
        drop(armed);
        let rendered = formatter.join().unwrap();
        assert!(rendered.contains("running: true"), "{}", rendered);
    }

    #[test]
    fn test_cron_expression_validated_on_construction() {
        let result = ScheduledTask::with_cron(counting_task(Arc::default()), "not a schedule");
        assert!(matches!(result, Err(WorkflowError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_run_delegates_to_task() {
        let runs = Arc::new(AtomicU32::new(0));
        let scheduled =
            ScheduledTask::with_cron(counting_task(Arc::clone(&runs)), "0 0 * * *").unwrap();

        let ctx = Context::default();
        let value = scheduled.run(&ctx).await.unwrap();

        assert_eq!(value, Value::from(1));
        assert_eq!(scheduled.name(), "tick");
        assert!(!scheduled.is_running());
    }
}
