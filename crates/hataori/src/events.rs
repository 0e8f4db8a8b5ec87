//! In-process publish/subscribe bus.
//!
//! The bus is an ordinary value: construct one and hand clones to whoever
//! emits or listens. Dispatch is synchronous and missed events are not kept.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Identifies a registered listener, for [`EventBus::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

struct Registration {
    id: ListenerId,
    once: bool,
    listener: Listener,
}

#[derive(Default)]
struct Inner {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<String, Vec<Registration>>>,
}

/// Event emitter shared by cloning.
///
/// ```
/// use hataori::events::EventBus;
/// use serde_json::json;
///
/// let bus = EventBus::new();
/// let id = bus.on("workflow:completed", |payload| println!("done: {}", payload));
/// assert_eq!(bus.emit("workflow:completed", &json!({ "workflow": "etl" })), 1);
/// assert!(bus.off("workflow:completed", id));
/// ```
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.inner.listeners.read();
        let counts: HashMap<&str, usize> = listeners
            .iter()
            .map(|(event, regs)| (event.as_str(), regs.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    /// Creates a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    fn register<F>(&self, event: &str, once: bool, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Registration {
                id,
                once,
                listener: Arc::new(listener),
            });
        id
    }

    /// Calls `listener` on every `event`.
    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(event, false, listener)
    }

    /// Calls `listener` on the next `event` only.
    pub fn once<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(event, true, listener)
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let Some(regs) = listeners.get_mut(event) else {
            return false;
        };
        let before = regs.len();
        regs.retain(|reg| reg.id != id);
        let removed = regs.len() != before;
        if regs.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Delivers `payload` to every listener of `event` and returns how many
    /// were called.
    ///
    /// Listeners run after the registry lock is released, so a listener may
    /// itself register, remove or emit.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let targets: Vec<Listener> = {
            let mut listeners = self.inner.listeners.write();
            let Some(regs) = listeners.get_mut(event) else {
                return 0;
            };
            let targets = regs.iter().map(|reg| Arc::clone(&reg.listener)).collect();
            regs.retain(|reg| !reg.once);
            if regs.is_empty() {
                listeners.remove(event);
            }
            targets
        };

        trace!(event, listeners = targets.len(), "emitting event");
        for listener in &targets {
            listener(payload);
        }
        targets.len()
    }

    /// Returns the number of listeners for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners.read().get(event).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn test_on_receives_every_emit() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.on("tick", move |payload| sink.lock().push(payload.clone()));

        bus.emit("tick", &json!(1));
        bus.emit("tick", &json!(2));
        bus.emit("other", &json!(3));

        assert_eq!(*seen.lock(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        bus.once("tick", move |_| *sink.lock() += 1);

        assert_eq!(bus.emit("tick", &Value::Null), 1);
        assert_eq!(bus.emit("tick", &Value::Null), 0);
        assert_eq!(*seen.lock(), 1);
        assert_eq!(bus.listener_count("tick"), 0);
    }

    #[test]
    fn test_off_removes_listener() {
        let bus = EventBus::new();
        let first = bus.on("tick", |_| {});
        let _second = bus.on("tick", |_| {});

        assert!(bus.off("tick", first));
        assert!(!bus.off("tick", first));
        assert_eq!(bus.listener_count("tick"), 1);
    }

    #[test]
    fn test_listener_may_emit_reentrantly() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        bus.on("outer", move |_| {
            inner_bus.emit("inner", &json!("nested"));
        });
        let sink = Arc::clone(&seen);
        bus.on("inner", move |payload| sink.lock().push(payload.clone()));

        bus.emit("outer", &Value::Null);
        assert_eq!(*seen.lock(), vec![json!("nested")]);
    }
}
