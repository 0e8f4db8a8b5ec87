//! State store implementations.

use async_trait::async_trait;
use dashmap::DashMap;
use hataori_core::{StateStore, TaskState, WorkflowError, WorkflowState};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Keeps checkpoints in memory. Useful for tests and for resuming within a
/// single process.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    workflows: DashMap<String, WorkflowState>,
    tasks: DashMap<String, TaskState>,
}

impl MemoryStateStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save_workflow_state(
        &self,
        id: &str,
        state: WorkflowState,
    ) -> Result<(), WorkflowError> {
        self.workflows.insert(id.to_string(), state);
        Ok(())
    }

    async fn get_workflow_state(&self, id: &str) -> Result<Option<WorkflowState>, WorkflowError> {
        Ok(self.workflows.get(id).map(|entry| *entry.value()))
    }

    async fn save_task_state(&self, id: &str, state: TaskState) -> Result<(), WorkflowError> {
        self.tasks.insert(id.to_string(), state);
        Ok(())
    }

    async fn get_task_state(&self, id: &str) -> Result<Option<TaskState>, WorkflowError> {
        Ok(self.tasks.get(id).map(|entry| *entry.value()))
    }
}

/// Writes one JSON document per id under a root directory:
/// `<root>/workflows/<id>.json` and `<root>/tasks/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    root: PathBuf,
}

impl JsonFileStateStore {
    /// Uses `root` as the storage directory. It is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the storage directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, kind: &str, id: &str) -> PathBuf {
        let file: String = id
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
                _ => '_',
            })
            .collect();
        self.root.join(kind).join(format!("{}.json", file))
    }

    async fn write<T: Serialize>(&self, kind: &str, id: &str, state: &T) -> Result<(), WorkflowError> {
        let path = self.path(kind, id);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| persistence(&path, e))?;
        }
        let json = serde_json::to_vec_pretty(state).map_err(|e| persistence(&path, e))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| persistence(&path, e))?;
        debug!(path = %path.display(), "state saved");
        Ok(())
    }

    async fn read<T: DeserializeOwned>(&self, kind: &str, id: &str) -> Result<Option<T>, WorkflowError> {
        let path = self.path(kind, id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(persistence(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| persistence(&path, e))
    }
}

fn persistence(path: &Path, error: impl std::fmt::Display) -> WorkflowError {
    WorkflowError::Persistence(format!("{}: {}", path.display(), error))
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn save_workflow_state(
        &self,
        id: &str,
        state: WorkflowState,
    ) -> Result<(), WorkflowError> {
        self.write("workflows", id, &state).await
    }

    async fn get_workflow_state(&self, id: &str) -> Result<Option<WorkflowState>, WorkflowError> {
        self.read("workflows", id).await
    }

    async fn save_task_state(&self, id: &str, state: TaskState) -> Result<(), WorkflowError> {
        self.write("tasks", id, &state).await
    }

    async fn get_task_state(&self, id: &str) -> Result<Option<TaskState>, WorkflowError> {
        self.read("tasks", id).await
    }
}
