//! Subscriber registry: event kind → ordered handler list.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::envelope::EventKind;

/// Callback invoked with an event's payload.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Identifies one registered handler, for targeted removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Handlers grouped by kind, kept in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(HandlerId, Handler)>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `kind`.
    pub fn insert(&mut self, kind: EventKind, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.entry(kind).or_default().push((id, handler));
        id
    }

    /// Remove every handler for `kind`. Returns how many were removed.
    pub fn remove_kind(&mut self, kind: &EventKind) -> usize {
        self.handlers.remove(kind).map_or(0, |list| list.len())
    }

    /// Remove one handler. Returns `false` if it was not registered.
    pub fn remove(&mut self, id: HandlerId) -> bool {
        let mut removed = false;
        self.handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(hid, _)| *hid != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Copy of the current handlers for `kind`, in registration order.
    ///
    /// Dispatch runs against this copy so handlers may register or remove
    /// handlers without affecting the message being delivered.
    pub fn snapshot(&self, kind: &EventKind) -> Vec<Handler> {
        self.handlers
            .get(kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn count(&self, kind: &EventKind) -> usize {
        self.handlers.get(kind).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .handlers
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    fn noop() -> Handler {
        Arc::new(|_: &Value| {})
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        for n in 0..3 {
            let order = Arc::clone(&order);
            let _ = registry.insert(
                EventKind::MetricsUpdate,
                Arc::new(move |_: &Value| order.lock().push(n)),
            );
        }
        for handler in registry.snapshot(&EventKind::MetricsUpdate) {
            handler(&json!(null));
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn snapshot_is_scoped_to_kind() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut registry = HandlerRegistry::new();
        let counter = Arc::clone(&hits);
        let _ = registry.insert(
            EventKind::NetworkUpdate,
            Arc::new(move |_: &Value| {
                let _ = counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert!(registry.snapshot(&EventKind::MetricsUpdate).is_empty());
        assert_eq!(registry.snapshot(&EventKind::NetworkUpdate).len(), 1);
    }

    #[test]
    fn remove_kind_drops_all_handlers() {
        let mut registry = HandlerRegistry::new();
        let _ = registry.insert(EventKind::Error, noop());
        let _ = registry.insert(EventKind::Error, noop());
        let _ = registry.insert(EventKind::Disconnect, noop());
        assert_eq!(registry.remove_kind(&EventKind::Error), 2);
        assert_eq!(registry.count(&EventKind::Error), 0);
        assert_eq!(registry.count(&EventKind::Disconnect), 1);
        assert_eq!(registry.remove_kind(&EventKind::Error), 0);
    }

    #[test]
    fn remove_single_handler() {
        let mut registry = HandlerRegistry::new();
        let first = registry.insert(EventKind::Reconnected, noop());
        let _second = registry.insert(EventKind::Reconnected, noop());
        assert!(registry.remove(first));
        assert!(!registry.remove(first));
        assert_eq!(registry.count(&EventKind::Reconnected), 1);
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let mut registry = HandlerRegistry::new();
        let a = registry.insert(EventKind::Error, noop());
        let b = registry.insert(EventKind::Connected, noop());
        assert_ne!(a, b);
    }
}
