//! Registry of workflows by name.

use crate::workflow::Workflow;
use dashmap::DashMap;
use hataori_core::{WorkflowError, WorkflowStatus};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Holds workflows under unique names and forwards control calls to them.
#[derive(Debug, Default)]
pub struct WorkflowManager {
    workflows: DashMap<String, Arc<Workflow>>,
}

impl WorkflowManager {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `workflow` under its name.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::Configuration`] if the name is taken.
    pub fn register(&self, workflow: Workflow) -> Result<Arc<Workflow>, WorkflowError> {
        let workflow = Arc::new(workflow);
        match self.workflows.entry(workflow.name().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(WorkflowError::Configuration(
                format!("Workflow '{}' is already registered", workflow.name()),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&workflow));
                info!("Workflow '{}' registered", workflow.name());
                Ok(workflow)
            }
        }
    }

    /// Returns the workflow registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Workflow>> {
        self.workflows.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Unregisters and returns the workflow under `name`.
    pub fn remove(&self, name: &str) -> Option<Arc<Workflow>> {
        self.workflows.remove(name).map(|(_, workflow)| workflow)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Executes the workflow registered under `name`.
    pub async fn execute(&self, name: &str, input: Value) -> Result<Value, WorkflowError> {
        let workflow = self.lookup(name)?;
        workflow.execute(input).await
    }

    /// Resumes the workflow registered under `name`. Unknown names are
    /// logged and yield `Value::Null`.
    ///
    /// # Errors
    ///
    /// [`WorkflowError::InvalidState`] if the workflow is not paused, plus
    /// any error of the resumed run.
    pub async fn resume(&self, name: &str) -> Result<Value, WorkflowError> {
        match self.get(name) {
            Some(workflow) => workflow.resume().await,
            None => {
                warn!("Cannot resume unknown workflow '{}'", name);
                Ok(Value::Null)
            }
        }
    }

    /// Pauses the workflow registered under `name`. Unknown names are
    /// logged and ignored.
    pub fn pause(&self, name: &str) -> bool {
        match self.get(name) {
            Some(workflow) => workflow.pause(),
            None => {
                warn!("Cannot pause unknown workflow '{}'", name);
                false
            }
        }
    }

    /// Cancels the workflow registered under `name`. Unknown names are
    /// logged and ignored.
    pub fn cancel(&self, name: &str) -> bool {
        match self.get(name) {
            Some(workflow) => workflow.cancel(),
            None => {
                warn!("Cannot cancel unknown workflow '{}'", name);
                false
            }
        }
    }

    /// Returns the status of the workflow registered under `name`.
    pub fn status(&self, name: &str) -> Option<WorkflowStatus> {
        self.get(name).map(|workflow| workflow.status())
    }

    fn lookup(&self, name: &str) -> Result<Arc<Workflow>, WorkflowError> {
        self.get(name)
            .ok_or_else(|| WorkflowError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use serde_json::json;

    fn workflow(name: &str) -> Workflow {
        Workflow::builder()
            .name(name)
            .task(Task::from_fn("only", |_ctx| async { Ok(json!(true)) }))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_execute_and_remove() {
        let manager = WorkflowManager::new();
        manager.register(workflow("b")).unwrap();
        manager.register(workflow("a")).unwrap();
        assert_eq!(manager.names(), vec!["a", "b"]);

        let output = manager.execute("a", Value::Null).await.unwrap();
        assert_eq!(output, json!({ "only": true }));
        assert_eq!(manager.status("a"), Some(WorkflowStatus::Completed));
        assert_eq!(manager.status("b"), Some(WorkflowStatus::Pending));

        assert!(manager.remove("a").is_some());
        assert!(manager.get("a").is_none());
    }

    #[tokio::test]
    async fn test_resume_of_idle_workflow_is_rejected() {
        let manager = WorkflowManager::new();
        manager.register(workflow("idle")).unwrap();

        assert!(matches!(
            manager.resume("idle").await,
            Err(WorkflowError::InvalidState {
                operation: "resume",
                status: WorkflowStatus::Pending,
            })
        ));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let manager = WorkflowManager::new();
        manager.register(workflow("wf")).unwrap();
        assert!(matches!(
            manager.register(workflow("wf")),
            Err(WorkflowError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_workflow() {
        let manager = WorkflowManager::new();

        assert!(matches!(
            manager.execute("ghost", Value::Null).await,
            Err(WorkflowError::NotFound(_))
        ));
        assert_eq!(manager.resume("ghost").await.unwrap(), Value::Null);
        assert!(!manager.pause("ghost"));
        assert!(!manager.cancel("ghost"));
        assert_eq!(manager.status("ghost"), None);
    }
}
