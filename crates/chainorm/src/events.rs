//! Typed event bus for executed chains.

use crate::builder::Built;
use crate::model::ActionEntry;
use crate::service::DbResult;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Which kind of chain produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Find,
    Insert,
    Update,
    Delete,
    Count,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Find => "find",
            EventKind::Insert => "insert",
            EventKind::Update => "update",
            EventKind::Delete => "delete",
            EventKind::Count => "count",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted after a successful execution, e.g. `items.update`.
#[derive(Debug, Clone, Copy)]
pub struct ModelEvent<'a> {
    pub table: &'a str,
    pub db_name: &'a str,
    pub kind: EventKind,
    /// Ordered audit log of the chain calls that built the statement.
    pub action_data: &'a [ActionEntry],
    /// Statement as sent.
    pub params: &'a Built,
    /// Raw driver result.
    pub result: &'a DbResult,
}

impl ModelEvent<'_> {
    /// `<table>.<kind>`
    pub fn name(&self) -> String {
        format!("{}.{}", self.table, self.kind)
    }
}

pub type Listener = Arc<dyn Fn(&ModelEvent<'_>) + Send + Sync>;

/// Listener registry keyed by table and event kind.
///
/// Append-only during normal operation; [`EventBus::clear`] removes listeners explicitly.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<(String, EventKind), Vec<Listener>>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventBus")
            .field("keys", &listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `table` / `kind`.
    pub fn on<F>(&self, table: &str, kind: EventKind, listener: F)
    where
        F: Fn(&ModelEvent<'_>) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((table.to_string(), kind))
            .or_default()
            .push(Arc::new(listener));
    }

    /// Deliver an event to every listener registered for its table and kind, in
    /// registration order.
    pub fn emit(&self, event: &ModelEvent<'_>) {
        // clone the list so listeners may register further listeners
        let targets = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(event.table.to_string(), event.kind))
            .cloned()
            .unwrap_or_default();
        for listener in targets {
            listener(event);
        }
    }

    pub fn listener_count(&self, table: &str, kind: EventKind) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(table.to_string(), kind))
            .map_or(0, Vec::len)
    }

    /// Remove listeners for one table, or all of them.
    pub fn clear(&self, table: Option<&str>) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        match table {
            Some(t) => listeners.retain(|(lt, _), _| lt != t),
            None => listeners.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event<'a>(table: &'a str, kind: EventKind, built: &'a Built, res: &'a DbResult) -> ModelEvent<'a> {
        ModelEvent {
            table,
            db_name: "main",
            kind,
            action_data: &[],
            params: built,
            result: res,
        }
    }

    #[test]
    fn listeners_fire_per_table_and_kind() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        bus.on("items", EventKind::Update, move |e| {
            assert_eq!(e.name(), "items.update");
            h.fetch_add(1, Ordering::SeqCst);
        });

        let built = Built::default();
        let res = DbResult::default();
        bus.emit(&event("items", EventKind::Update, &built, &res));
        bus.emit(&event("items", EventKind::Insert, &built, &res));
        bus.emit(&event("protos", EventKind::Update, &built, &res));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_by_table() {
        let bus = EventBus::new();
        bus.on("a", EventKind::Find, |_| {});
        bus.on("a", EventKind::Find, |_| {});
        bus.on("b", EventKind::Find, |_| {});
        assert_eq!(bus.listener_count("a", EventKind::Find), 2);
        bus.clear(Some("a"));
        assert_eq!(bus.listener_count("a", EventKind::Find), 0);
        assert_eq!(bus.listener_count("b", EventKind::Find), 1);
        bus.clear(None);
        assert_eq!(bus.listener_count("b", EventKind::Find), 0);
    }
}
