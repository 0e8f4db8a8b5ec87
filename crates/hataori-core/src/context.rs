//! Execution context shared by every task of one workflow run.

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Type-safe context key wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey(String);

impl ContextKey {
    /// Creates a new ContextKey.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ContextKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ContextKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for ContextKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Execution context for tasks and workflows.
///
/// Holds the caller's input, the final output, heterogeneous scratch data
/// and the outputs recorded by each task under its name. Cloning is cheap and
/// every clone sees the same state, so parallel children can share one
/// context; all maps sit behind locks that are never held across an await.
///
/// # Examples
///
/// ```
/// use hataori_core::Context;
/// use serde_json::json;
///
/// let ctx = Context::new(json!({ "user_id": 7 }));
///
/// ctx.insert("attempts", 3u32);
/// ctx.insert("name", "Alice".to_string());
/// assert_eq!(ctx.get::<u32>("attempts").as_deref(), Some(&3));
/// assert_eq!(ctx.get::<String>("attempts"), None);
///
/// ctx.record_output("load", json!([1, 2, 3]));
/// assert_eq!(ctx.task_output("load"), Some(json!([1, 2, 3])));
/// assert_eq!(ctx.input()["user_id"], 7);
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    input: Value,
    output: RwLock<Option<Value>>,
    data: RwLock<HashMap<ContextKey, Arc<dyn Any + Send + Sync>>>,
    outputs: RwLock<Vec<(String, Value)>>,
    started_at: Instant,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<ContextKey> = self.inner.data.read().keys().cloned().collect();
        let outputs: Vec<String> = self
            .inner
            .outputs
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        f.debug_struct("Context")
            .field("input", &self.inner.input)
            .field("keys", &keys)
            .field("outputs", &outputs)
            .field("started_at", &self.inner.started_at)
            .finish()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

impl Context {
    /// Creates a context around the caller's input.
    pub fn new(input: Value) -> Self {
        Self {
            inner: Arc::new(Inner {
                input,
                output: RwLock::new(None),
                data: RwLock::new(HashMap::new()),
                outputs: RwLock::new(Vec::new()),
                started_at: Instant::now(),
            }),
        }
    }

    /// Returns the input this context was created with.
    pub fn input(&self) -> &Value {
        &self.inner.input
    }

    /// Returns the output, or `Value::Null` if none was set yet.
    pub fn output(&self) -> Value {
        self.inner.output.read().clone().unwrap_or(Value::Null)
    }

    /// Returns `true` once an output has been set.
    pub fn has_output(&self) -> bool {
        self.inner.output.read().is_some()
    }

    /// Sets the output, replacing any previous one.
    pub fn set_output(&self, value: Value) {
        *self.inner.output.write() = Some(value);
    }

    /// Inserts a scratch value with the given key.
    ///
    /// If the key already exists, the previous value is replaced.
    pub fn insert<T: Any + Send + Sync>(&self, key: impl Into<ContextKey>, value: T) {
        self.inner.data.write().insert(key.into(), Arc::new(value));
    }

    /// Returns the scratch value for the given key.
    ///
    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.inner.data.read().get(key).cloned()?;
        value.downcast::<T>().ok()
    }

    /// Removes a scratch value by key.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.data.write().remove(key).is_some()
    }

    /// Returns `true` if the context contains a scratch value for the key.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.data.read().contains_key(key)
    }

    /// Returns all scratch keys.
    pub fn keys(&self) -> Vec<ContextKey> {
        self.inner.data.read().keys().cloned().collect()
    }

    /// Records the output of a task under its name.
    ///
    /// There is no way to erase an entry. Recording the same name again
    /// replaces the value in place, which happens when a task re-runs.
    pub fn record_output(&self, task_name: impl Into<String>, value: Value) {
        let task_name = task_name.into();
        let mut outputs = self.inner.outputs.write();
        match outputs.iter_mut().find(|(name, _)| *name == task_name) {
            Some((_, slot)) => *slot = value,
            None => outputs.push((task_name, value)),
        }
    }

    /// Returns the output recorded for a task.
    pub fn task_output(&self, task_name: &str) -> Option<Value> {
        self.inner
            .outputs
            .read()
            .iter()
            .find(|(name, _)| name == task_name)
            .map(|(_, value)| value.clone())
    }

    /// Returns every recorded task output in recording order.
    pub fn task_outputs(&self) -> Vec<(String, Value)> {
        self.inner.outputs.read().clone()
    }

    /// Collapses all task outputs into one JSON object keyed by task name.
    pub fn collapse_outputs(&self) -> Value {
        let map: Map<String, Value> = self.inner.outputs.read().iter().cloned().collect();
        Value::Object(map)
    }

    /// Returns the time elapsed since the context was created.
    pub fn elapsed(&self) -> std::time::Duration {
        self.inner.started_at.elapsed()
    }
}
