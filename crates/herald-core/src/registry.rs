//! Handler registry.
//!
//! [`HandlerRegistry`] owns every registration of one emitter: a map from
//! event kind to an ordered [`HandlerSet`], and a separate set of global
//! handlers. Global handlers are a structurally distinct registration, not an
//! entry under some reserved kind.
//!
//! The registry does no locking of its own; the emitter keeps it behind a
//! mutex and only ever holds that mutex to mutate or snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::{ErasedHandler, HandlerId};
use crate::schema::EventSchema;
use crate::subscription::SignalHook;

struct Entry<S> {
    id: HandlerId,
    handler: ErasedHandler<S>,
    /// Signal callbacks that remove this entry; withdrawn when it is dropped.
    hooks: Vec<SignalHook>,
}

/// An insertion-ordered set of handlers keyed by identity.
pub struct HandlerSet<S> {
    entries: Vec<Entry<S>>,
}

impl<S> Default for HandlerSet<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<S> HandlerSet<S> {
    /// Adds a handler. Returns `false` if its id was already present.
    pub fn insert(&mut self, id: HandlerId, handler: ErasedHandler<S>) -> bool {
        if self.contains(id) {
            return false;
        }
        self.entries.push(Entry {
            id,
            handler,
            hooks: Vec::new(),
        });
        true
    }

    /// Ties a signal hook to the lifetime of a handler.
    ///
    /// Returns `false`, dropping the hook, if the handler is absent.
    pub fn bind(&mut self, id: HandlerId, hook: SignalHook) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                if hook.is_attached() {
                    entry.hooks.push(hook);
                }
                true
            }
            None => false,
        }
    }

    /// Removes a handler. Returns `false` if it was absent.
    pub fn remove(&mut self, id: HandlerId) -> bool {
        match self.entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Returns `true` if the id is registered.
    pub fn contains(&self, id: HandlerId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Returns the number of handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no handlers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every handler.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Copies the handlers out in insertion order.
    pub fn snapshot(&self) -> Vec<ErasedHandler<S>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(&entry.handler))
            .collect()
    }
}

/// Registrations of one emitter.
pub struct HandlerRegistry<S: EventSchema> {
    events: HashMap<S::Kind, HandlerSet<S>>,
    global: HandlerSet<S>,
}

impl<S: EventSchema> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EventSchema> HandlerRegistry<S> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            events: HashMap::new(),
            global: HandlerSet::default(),
        }
    }

    /// Adds a handler for one event kind, creating its set if needed.
    pub fn add_event_handler(
        &mut self,
        kind: S::Kind,
        id: HandlerId,
        handler: ErasedHandler<S>,
    ) -> bool {
        self.events.entry(kind).or_default().insert(id, handler)
    }

    /// Adds a global handler.
    pub fn add_global_handler(&mut self, id: HandlerId, handler: ErasedHandler<S>) -> bool {
        self.global.insert(id, handler)
    }

    /// Ties a signal hook to a handler of one event kind.
    pub fn bind_event_hook(&mut self, kind: S::Kind, id: HandlerId, hook: SignalHook) -> bool {
        self.events
            .get_mut(&kind)
            .is_some_and(|set| set.bind(id, hook))
    }

    /// Ties a signal hook to a global handler.
    pub fn bind_global_hook(&mut self, id: HandlerId, hook: SignalHook) -> bool {
        self.global.bind(id, hook)
    }

    /// Removes one handler from an event kind. Empty sets are pruned.
    pub fn remove_event_handler(&mut self, kind: S::Kind, id: HandlerId) -> bool {
        let Some(set) = self.events.get_mut(&kind) else {
            return false;
        };
        let removed = set.remove(id);
        if set.is_empty() {
            self.events.remove(&kind);
        }
        removed
    }

    /// Removes every handler registered for an event kind.
    ///
    /// Returns how many were removed.
    pub fn remove_all_handlers(&mut self, kind: S::Kind) -> usize {
        self.events.remove(&kind).map_or(0, |set| set.len())
    }

    /// Removes a global handler.
    pub fn remove_global_handler(&mut self, id: HandlerId) -> bool {
        self.global.remove(id)
    }

    /// Removes every event and global handler.
    pub fn clear(&mut self) {
        self.events.clear();
        self.global.clear();
    }

    /// Snapshot of the handlers for one kind, in registration order.
    pub fn event_snapshot(&self, kind: S::Kind) -> Vec<ErasedHandler<S>> {
        self.events
            .get(&kind)
            .map(HandlerSet::snapshot)
            .unwrap_or_default()
    }

    /// Snapshot of the global handlers, in registration order.
    pub fn global_snapshot(&self) -> Vec<ErasedHandler<S>> {
        self.global.snapshot()
    }

    /// Number of handlers for one kind.
    pub fn handler_count(&self, kind: S::Kind) -> usize {
        self.events.get(&kind).map_or(0, HandlerSet::len)
    }

    /// Number of global handlers.
    pub fn global_count(&self) -> usize {
        self.global.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.events.values().all(HandlerSet::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::schema::fixtures::{TestEvent, TestKind};

    fn noop() -> ErasedHandler<TestEvent> {
        Arc::new(|_: &TestEvent| {})
    }

    #[test]
    fn test_add_is_idempotent_by_identity() {
        let mut registry = HandlerRegistry::<TestEvent>::new();
        let id = HandlerId::next();

        assert!(registry.add_event_handler(TestKind::Hello, id, noop()));
        assert!(!registry.add_event_handler(TestKind::Hello, id, noop()));
        assert_eq!(registry.handler_count(TestKind::Hello), 1);

        // Same identity under another kind is a separate registration.
        assert!(registry.add_event_handler(TestKind::Message, id, noop()));
        assert_eq!(registry.handler_count(TestKind::Message), 1);
    }

    #[test]
    fn test_snapshot_preserves_insertion_order() {
        let mut registry = HandlerRegistry::<TestEvent>::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for label in ["a", "b", "c"] {
            let order = Arc::clone(&order);
            registry.add_event_handler(
                TestKind::Hello,
                HandlerId::next(),
                Arc::new(move |_: &TestEvent| order.lock().push(label)),
            );
        }

        for handler in registry.event_snapshot(TestKind::Hello) {
            handler(&TestEvent::Hello);
        }
        assert_eq!(*order.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_prunes_empty_sets() {
        let mut registry = HandlerRegistry::<TestEvent>::new();
        let id = HandlerId::next();
        registry.add_event_handler(TestKind::Hello, id, noop());

        assert!(registry.remove_event_handler(TestKind::Hello, id));
        assert!(!registry.remove_event_handler(TestKind::Hello, id));
        assert!(registry.event_snapshot(TestKind::Hello).is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_absent_is_silent() {
        let mut registry = HandlerRegistry::<TestEvent>::new();
        assert!(!registry.remove_event_handler(TestKind::Count, HandlerId::next()));
        assert!(!registry.remove_global_handler(HandlerId::next()));
        assert_eq!(registry.remove_all_handlers(TestKind::Count), 0);
    }

    #[test]
    fn test_remove_all_leaves_other_registrations() {
        let mut registry = HandlerRegistry::<TestEvent>::new();
        registry.add_event_handler(TestKind::Hello, HandlerId::next(), noop());
        registry.add_event_handler(TestKind::Hello, HandlerId::next(), noop());
        registry.add_event_handler(TestKind::Message, HandlerId::next(), noop());
        registry.add_global_handler(HandlerId::next(), noop());

        assert_eq!(registry.remove_all_handlers(TestKind::Hello), 2);
        assert_eq!(registry.handler_count(TestKind::Hello), 0);
        assert_eq!(registry.handler_count(TestKind::Message), 1);
        assert_eq!(registry.global_count(), 1);
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut registry = HandlerRegistry::<TestEvent>::new();
        registry.add_event_handler(TestKind::Hello, HandlerId::next(), noop());
        registry.add_global_handler(HandlerId::next(), noop());

        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.global_snapshot().is_empty());
    }

    #[test]
    fn test_removing_handler_drops_its_hooks() {
        let mut registry = HandlerRegistry::<TestEvent>::new();
        let withdrawn = Arc::new(AtomicUsize::new(0));
        let hook = || {
            let withdrawn = Arc::clone(&withdrawn);
            SignalHook::new(move || {
                withdrawn.fetch_add(1, Ordering::SeqCst);
            })
        };

        let first = HandlerId::next();
        let second = HandlerId::next();
        let global = HandlerId::next();
        registry.add_event_handler(TestKind::Hello, first, noop());
        registry.add_event_handler(TestKind::Hello, second, noop());
        registry.add_global_handler(global, noop());
        assert!(registry.bind_event_hook(TestKind::Hello, first, hook()));
        assert!(registry.bind_event_hook(TestKind::Hello, first, hook()));
        assert!(registry.bind_global_hook(global, hook()));
        assert!(registry.bind_event_hook(TestKind::Hello, second, SignalHook::none()));

        registry.remove_event_handler(TestKind::Hello, first);
        assert_eq!(withdrawn.load(Ordering::SeqCst), 2);

        registry.clear();
        assert_eq!(withdrawn.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_hook_for_absent_handler_is_dropped() {
        let mut registry = HandlerRegistry::<TestEvent>::new();
        let withdrawn = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&withdrawn);
        let hook = SignalHook::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!registry.bind_event_hook(TestKind::Count, HandlerId::next(), hook));
        assert_eq!(withdrawn.load(Ordering::SeqCst), 1);
    }
}
