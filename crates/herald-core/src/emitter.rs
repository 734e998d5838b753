//! The emitter.
//!
//! [`Emitter`] ties the pieces together: a [`HandlerRegistry`] behind a mutex,
//! the dispatch loop, and an optional relay endpoint. It is a cheap handle;
//! clones share the same registrations and relay.
//!
//! # Dispatch
//!
//! ```text
//!  emit ──▶ relay.send (if configured)
//!    │
//!    └────▶ snapshot ──▶ event handlers ──▶ global handlers
//!                  ▲
//!  relay inbound ──┘ (never re-sent)
//! ```
//!
//! Both handler sets are copied out before any handler runs and the lock is
//! released, so handlers may freely call back into the emitter. Registrations
//! made during a pass only see later passes; removals made during a pass do
//! not stop handlers already in the snapshot.
//!
//! A panicking handler unwinds out of `emit` and skips the rest of that pass.
//! The emitter stays usable afterwards.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{Level, debug, span, trace, warn};

use crate::error::{EmitterResult, RelayError, RelayResult};
use crate::handler::{ErasedHandler, Handler, HandlerId};
use crate::registry::HandlerRegistry;
use crate::relay::{EmitterOptions, RelayConnector, RelayMessage, RelayTransport};
use crate::schema::{EventKind, EventName, EventSchema};
use crate::subscription::{CancelSignal, Subscription, subscribe};

pub(crate) struct Inner<S: EventSchema> {
    registry: Mutex<HandlerRegistry<S>>,
    relay: Mutex<Option<Arc<dyn RelayTransport>>>,
    /// Bumped on every `set_options`; inbound messages tagged with an older
    /// value come from a replaced endpoint.
    generation: AtomicU64,
    connector: Option<Arc<dyn RelayConnector>>,
}

impl<S: EventSchema> Inner<S> {
    fn new(connector: Option<Arc<dyn RelayConnector>>) -> Self {
        Self {
            registry: Mutex::new(HandlerRegistry::new()),
            relay: Mutex::new(None),
            generation: AtomicU64::new(0),
            connector,
        }
    }

    fn dispatch(&self, event: &S) {
        let kind = event.kind();
        let span = span!(Level::TRACE, "dispatch", event = %kind);
        let _enter = span.enter();

        let (handlers, global) = {
            let registry = self.registry.lock();
            (registry.event_snapshot(kind), registry.global_snapshot())
        };
        trace!(
            handlers = handlers.len(),
            global = global.len(),
            "Dispatching event"
        );

        for handler in handlers.iter().chain(global.iter()) {
            handler(event);
        }
    }

    fn forward(&self, event: &S) -> RelayResult<()> {
        let transport = self.relay.lock().clone();
        let Some(transport) = transport else {
            return Ok(());
        };
        let message = event.to_message()?;
        trace!(channel = transport.channel(), event = %message.event, "Relaying event");
        transport.send(message)
    }

    fn receive(&self, generation: u64, message: RelayMessage) {
        if self.generation.load(Ordering::Acquire) != generation {
            trace!(event = %message.event, "Ignoring message from replaced relay endpoint");
            return;
        }
        match S::from_message(message) {
            Ok(event) => self.dispatch(&event),
            Err(error) => warn!(%error, "Dropping relay message"),
        }
    }
}

// =============================================================================
// Registrar
// =============================================================================

/// The registration surface of an [`Emitter`], optionally bound to a
/// cancellation signal.
///
/// Obtained from [`Emitter::with_signal`]. The methods on [`Emitter`] itself
/// forward to an unbound registrar.
pub struct Registrar<'a, S: EventSchema> {
    inner: &'a Arc<Inner<S>>,
    signal: Option<&'a dyn CancelSignal>,
}

impl<S: EventSchema> Registrar<'_, S> {
    /// Registers a handler for one event kind.
    pub fn on<K: EventKind<S>>(
        &self,
        f: impl Fn(&K::Payload) + Send + Sync + 'static,
    ) -> Subscription {
        self.on_handler::<K>(&Handler::new(f))
    }

    /// Registers an identified handler for one event kind.
    ///
    /// Registering the same handler twice for a kind keeps one registration.
    pub fn on_handler<K: EventKind<S>>(&self, handler: &Handler<K::Payload>) -> Subscription {
        let id = handler.id();
        let handler = handler.clone();
        let erased: ErasedHandler<S> = Arc::new(move |event: &S| {
            if let Some(payload) = K::payload(event) {
                handler.call(payload);
            }
        });
        self.register_event(K::KIND, id, move |_| erased)
    }

    /// Registers a handler for every event.
    pub fn on_any<F>(&self, f: F) -> Subscription
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.on_any_handler(&Handler::new(f))
    }

    /// Registers an identified handler for every event.
    pub fn on_any_handler(&self, handler: &Handler<S>) -> Subscription {
        let id = handler.id();
        let handler = handler.clone();
        let erased: ErasedHandler<S> = Arc::new(move |event: &S| handler.call(event));
        self.register_global(id, move |_| erased)
    }

    /// Registers a handler that runs for the next occurrence of one kind only.
    ///
    /// The wrapper cancels its own subscription before `f` runs, so `f` never
    /// runs twice, even when two threads dispatch at once, and the
    /// registration is gone even if `f` panics.
    pub fn once<K: EventKind<S>>(
        &self,
        f: impl FnOnce(&K::Payload) + Send + 'static,
    ) -> Subscription {
        let slot = Mutex::new(Some(f));
        self.register_event(K::KIND, HandlerId::next(), move |subscription| {
            let subscription = subscription.clone();
            let wrapper: ErasedHandler<S> = Arc::new(move |event: &S| {
                let Some(payload) = K::payload(event) else {
                    return;
                };
                let f = slot.lock().take();
                if let Some(f) = f {
                    subscription.cancel();
                    f(payload);
                }
            });
            wrapper
        })
    }

    /// Registers a global handler that runs for the next event only.
    pub fn once_any<F>(&self, f: F) -> Subscription
    where
        F: FnOnce(&S) + Send + 'static,
    {
        let slot = Mutex::new(Some(f));
        self.register_global(HandlerId::next(), move |subscription| {
            let subscription = subscription.clone();
            let wrapper: ErasedHandler<S> = Arc::new(move |event: &S| {
                let f = slot.lock().take();
                if let Some(f) = f {
                    subscription.cancel();
                    f(event);
                }
            });
            wrapper
        })
    }

    fn register_event<H>(&self, kind: S::Kind, id: HandlerId, handler: H) -> Subscription
    where
        H: FnOnce(&Subscription) -> ErasedHandler<S>,
    {
        let weak = Arc::downgrade(self.inner);
        subscribe(
            |subscription, hook| {
                let handler = handler(subscription);
                let mut registry = self.inner.registry.lock();
                if registry.add_event_handler(kind, id, handler) {
                    debug!(event = %kind, handler = %id, "Handler registered");
                }
                registry.bind_event_hook(kind, id, hook);
            },
            move || remove_event(&weak, kind, id),
            self.signal,
        )
    }

    fn register_global<H>(&self, id: HandlerId, handler: H) -> Subscription
    where
        H: FnOnce(&Subscription) -> ErasedHandler<S>,
    {
        let weak = Arc::downgrade(self.inner);
        subscribe(
            |subscription, hook| {
                let handler = handler(subscription);
                let mut registry = self.inner.registry.lock();
                if registry.add_global_handler(id, handler) {
                    debug!(handler = %id, "Global handler registered");
                }
                registry.bind_global_hook(id, hook);
            },
            move || remove_global(&weak, id),
            self.signal,
        )
    }
}

fn remove_event<S: EventSchema>(inner: &Weak<Inner<S>>, kind: S::Kind, id: HandlerId) {
    if let Some(inner) = inner.upgrade()
        && inner.registry.lock().remove_event_handler(kind, id)
    {
        debug!(event = %kind, handler = %id, "Handler removed");
    }
}

fn remove_global<S: EventSchema>(inner: &Weak<Inner<S>>, id: HandlerId) {
    if let Some(inner) = inner.upgrade()
        && inner.registry.lock().remove_global_handler(id)
    {
        debug!(handler = %id, "Global handler removed");
    }
}

// =============================================================================
// Emitter
// =============================================================================

/// A typed publish/subscribe emitter for the schema `S`.
///
/// # Example
///
/// ```rust,ignore
/// let emitter = Emitter::<ChatEvent>::new();
///
/// let subscription = emitter.on::<chat_event::Message>(|text| println!("{text}"));
/// emitter.on_any(|event| println!("{:?}", event.kind()));
///
/// emitter.emit::<chat_event::Message>("hi".to_string())?;
/// subscription.cancel();
/// ```
pub struct Emitter<S: EventSchema> {
    pub(crate) inner: Arc<Inner<S>>,
}

impl<S: EventSchema> Emitter<S> {
    /// Creates an emitter without relay support.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(None)),
        }
    }

    /// Starts building an emitter with a relay connector or initial options.
    pub fn builder() -> EmitterBuilder<S> {
        EmitterBuilder::default()
    }

    fn registrar(&self) -> Registrar<'_, S> {
        Registrar {
            inner: &self.inner,
            signal: None,
        }
    }

    /// Returns a registration surface whose registrations are removed when
    /// `signal` is cancelled.
    ///
    /// If the signal is already cancelled, registrations through it do
    /// nothing and return no-op subscriptions.
    pub fn with_signal<'a, C: CancelSignal>(&'a self, signal: &'a C) -> Registrar<'a, S> {
        Registrar {
            inner: &self.inner,
            signal: Some(signal),
        }
    }

    /// Registers a handler for one event kind.
    pub fn on<K: EventKind<S>>(
        &self,
        f: impl Fn(&K::Payload) + Send + Sync + 'static,
    ) -> Subscription {
        self.registrar().on::<K>(f)
    }

    /// Registers an identified handler for one event kind.
    pub fn on_handler<K: EventKind<S>>(&self, handler: &Handler<K::Payload>) -> Subscription {
        self.registrar().on_handler::<K>(handler)
    }

    /// Registers a handler for every event.
    pub fn on_any<F>(&self, f: F) -> Subscription
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.registrar().on_any(f)
    }

    /// Registers an identified handler for every event.
    pub fn on_any_handler(&self, handler: &Handler<S>) -> Subscription {
        self.registrar().on_any_handler(handler)
    }

    /// Registers a handler for the next occurrence of one kind.
    pub fn once<K: EventKind<S>>(
        &self,
        f: impl FnOnce(&K::Payload) + Send + 'static,
    ) -> Subscription {
        self.registrar().once::<K>(f)
    }

    /// Registers a global handler for the next event.
    pub fn once_any<F>(&self, f: F) -> Subscription
    where
        F: FnOnce(&S) + Send + 'static,
    {
        self.registrar().once_any(f)
    }

    /// Removes one handler from an event kind. Absent handlers are ignored.
    pub fn off<K: EventKind<S>>(&self, handler: &Handler<K::Payload>) {
        remove_event(&Arc::downgrade(&self.inner), K::KIND, handler.id());
    }

    /// Removes every handler of one event kind.
    pub fn off_all<K: EventKind<S>>(&self) {
        self.off_kind(K::KIND);
    }

    /// Removes every handler of `kind`.
    pub fn off_kind(&self, kind: S::Kind) {
        let removed = self.inner.registry.lock().remove_all_handlers(kind);
        if removed > 0 {
            debug!(event = %kind, removed, "Handlers removed");
        }
    }

    /// Removes one global handler. Absent handlers are ignored.
    pub fn off_any(&self, handler: &Handler<S>) {
        remove_global(&Arc::downgrade(&self.inner), handler.id());
    }

    /// Removes every event and global handler. The relay is left alone.
    pub fn clear(&self) {
        self.inner.registry.lock().clear();
        debug!("All handlers cleared");
    }

    /// Emits an event of kind `K`.
    ///
    /// With a relay configured the event is sent to the channel first. Local
    /// handlers always run; a relay failure is reported only afterwards.
    pub fn emit<K: EventKind<S>>(&self, payload: K::Payload) -> EmitterResult<()> {
        self.emit_event(K::wrap(payload))
    }

    /// Emits an already constructed event.
    pub fn emit_event(&self, event: S) -> EmitterResult<()> {
        let relayed = self.inner.forward(&event);
        if let Err(error) = &relayed {
            debug!(event = %event.kind(), %error, "Relay send failed");
        }
        self.inner.dispatch(&event);
        Ok(relayed?)
    }

    /// Reconfigures the relay.
    ///
    /// A non-empty channel is joined through the emitter's connector first;
    /// if that fails the current relay stays in place. Otherwise the previous
    /// endpoint, if any, is dropped and messages still arriving from it are
    /// ignored. Handlers are unaffected.
    pub fn set_options(&self, options: EmitterOptions) -> EmitterResult<()> {
        let mut relay = self.inner.relay.lock();

        let transport = match options.channel() {
            Some(channel) => {
                let connector = self.inner.connector.as_ref().ok_or_else(|| {
                    RelayError::NoConnector {
                        channel: channel.to_string(),
                    }
                })?;
                Some(connector.connect(channel)?)
            }
            None => None,
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(previous) = relay.take() {
            debug!(channel = previous.channel(), "Relay detached");
        }

        let Some(transport) = transport else {
            return Ok(());
        };
        let weak = Arc::downgrade(&self.inner);
        transport.on_receive(Arc::new(move |message| {
            if let Some(inner) = weak.upgrade() {
                inner.receive(generation, message);
            }
        }));

        debug!(channel = transport.channel(), "Relay attached");
        *relay = Some(transport);
        Ok(())
    }

    /// The channel of the active relay, if any.
    pub fn relay_channel(&self) -> Option<String> {
        self.inner
            .relay
            .lock()
            .as_ref()
            .map(|transport| transport.channel().to_string())
    }

    /// Number of handlers registered for kind `K`.
    pub fn handler_count<K: EventKind<S>>(&self) -> usize {
        self.inner.registry.lock().handler_count(K::KIND)
    }

    /// Number of global handlers.
    pub fn any_handler_count(&self) -> usize {
        self.inner.registry.lock().global_count()
    }
}

impl<S: EventSchema> Default for Emitter<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: EventSchema> Clone for Emitter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: EventSchema> fmt::Debug for Emitter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.registry.lock();
        let handlers: usize = S::Kind::all()
            .iter()
            .map(|kind| registry.handler_count(*kind))
            .sum();
        f.debug_struct("Emitter")
            .field("handlers", &handlers)
            .field("global_handlers", &registry.global_count())
            .field("relay", &self.relay_channel())
            .finish()
    }
}

// =============================================================================
// EmitterBuilder
// =============================================================================

/// Builder for [`Emitter`].
pub struct EmitterBuilder<S: EventSchema> {
    connector: Option<Arc<dyn RelayConnector>>,
    options: EmitterOptions,
    _schema: PhantomData<fn() -> S>,
}

impl<S: EventSchema> Default for EmitterBuilder<S> {
    fn default() -> Self {
        Self {
            connector: None,
            options: EmitterOptions::default(),
            _schema: PhantomData,
        }
    }
}

impl<S: EventSchema> EmitterBuilder<S> {
    /// Sets the connector used to open relay channels.
    pub fn connector(mut self, connector: impl RelayConnector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Sets a shared connector.
    pub fn shared_connector(mut self, connector: Arc<dyn RelayConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets the initial options.
    pub fn options(mut self, options: EmitterOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the emitter, joining the configured relay channel if any.
    pub fn build(self) -> EmitterResult<Emitter<S>> {
        let emitter = Emitter {
            inner: Arc::new(Inner::new(self.connector)),
        };
        if self.options.channel().is_some() {
            emitter.set_options(self.options)?;
        }
        Ok(emitter)
    }
}


#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::testing::MockConnector;
    use super::*;
    use crate::error::EmitterError;
    use crate::schema::fixtures::{Count, Hello, LocalOnly, Message, TestEvent, TestKind};
    use crate::subscription::AbortSignal;
    use serde_json::{Value, json};
    use tokio_util::sync::CancellationToken;

    type Log = Arc<Mutex<Vec<String>>>;

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn push(log: &Log, entry: impl Into<String>) {
        log.lock().push(entry.into());
    }

    #[test]
    fn test_on_receives_only_its_kind() {
        let emitter = Emitter::<TestEvent>::new();
        let seen = log();

        let seen_clone = Arc::clone(&seen);
        emitter.on::<Message>(move |text| push(&seen_clone, text.as_str()));

        emitter.emit::<Message>("hi".into()).unwrap();
        emitter.emit::<Count>(3).unwrap();

        assert_eq!(*seen.lock(), vec!["hi"]);
    }

    #[test]
    fn test_event_handlers_run_before_global() {
        let emitter = Emitter::<TestEvent>::new();
        let order = log();

        let o = Arc::clone(&order);
        emitter.on_any(move |_| push(&o, "global"));
        let o = Arc::clone(&order);
        emitter.on::<Hello>(move |_| push(&o, "a"));
        let o = Arc::clone(&order);
        emitter.on::<Hello>(move |_| push(&o, "b"));

        emitter.emit::<Hello>(()).unwrap();

        assert_eq!(*order.lock(), vec!["a", "b", "global"]);
    }

    #[test]
    fn test_global_handler_sees_tagged_event() {
        let emitter = Emitter::<TestEvent>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        emitter.on_any(move |event: &TestEvent| seen_clone.lock().push(event.clone()));

        emitter.emit::<Count>(7).unwrap();
        assert_eq!(*seen.lock(), vec![TestEvent::Count(7)]);
        assert_eq!(seen.lock()[0].kind(), TestKind::Count);
    }

    #[test]
    fn test_duplicate_handler_registers_once() {
        let emitter = Emitter::<TestEvent>::new();
        let calls = log();

        let calls_clone = Arc::clone(&calls);
        let handler = Handler::new(move |_: &()| push(&calls_clone, "h"));
        emitter.on_handler::<Hello>(&handler);
        emitter.on_handler::<Hello>(&handler.clone());

        emitter.emit::<Hello>(()).unwrap();
        assert_eq!(calls.lock().len(), 1);
        assert_eq!(emitter.handler_count::<Hello>(), 1);
    }

    #[test]
    fn test_off_removes_by_identity() {
        let emitter = Emitter::<TestEvent>::new();
        let calls = log();

        let c = Arc::clone(&calls);
        let first = Handler::new(move |_: &()| push(&c, "first"));
        let c = Arc::clone(&calls);
        let second = Handler::new(move |_: &()| push(&c, "second"));
        emitter.on_handler::<Hello>(&first);
        emitter.on_handler::<Hello>(&second);

        emitter.off::<Hello>(&first);
        emitter.off::<Hello>(&first);
        emitter.emit::<Hello>(()).unwrap();

        assert_eq!(*calls.lock(), vec!["second"]);
    }

    #[test]
    fn test_off_all_and_off_any() {
        let emitter = Emitter::<TestEvent>::new();
        emitter.on::<Hello>(|_| {});
        emitter.on::<Hello>(|_| {});
        emitter.on::<Count>(|_| {});
        let global = Handler::new(|_: &TestEvent| {});
        emitter.on_any_handler(&global);

        emitter.off_all::<Hello>();
        emitter.off_any(&global);

        assert_eq!(emitter.handler_count::<Hello>(), 0);
        assert_eq!(emitter.handler_count::<Count>(), 1);
        assert_eq!(emitter.any_handler_count(), 0);
    }

    #[test]
    fn test_subscription_cancel() {
        let emitter = Emitter::<TestEvent>::new();
        let calls = log();

        let c = Arc::clone(&calls);
        let subscription = emitter.on::<Hello>(move |_| push(&c, "h"));
        let c = Arc::clone(&calls);
        let global = emitter.on_any(move |_| push(&c, "g"));

        subscription.cancel();
        global.cancel();
        global.cancel();
        emitter.emit::<Hello>(()).unwrap();

        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_dropping_subscription_keeps_handler() {
        let emitter = Emitter::<TestEvent>::new();
        drop(emitter.on::<Hello>(|_| {}));
        assert_eq!(emitter.handler_count::<Hello>(), 1);
    }

    #[test]
    fn test_cancel_after_emitter_dropped_is_noop() {
        let emitter = Emitter::<TestEvent>::new();
        let subscription = emitter.on::<Hello>(|_| {});
        drop(emitter);
        subscription.cancel();
    }

    #[test]
    fn test_once_fires_once() {
        let emitter = Emitter::<TestEvent>::new();
        let calls = log();

        let c = Arc::clone(&calls);
        emitter.once::<Count>(move |n| push(&c, n.to_string()));

        emitter.emit::<Count>(1).unwrap();
        emitter.emit::<Count>(2).unwrap();

        assert_eq!(*calls.lock(), vec!["1"]);
        assert_eq!(emitter.handler_count::<Count>(), 0);
    }

    #[test]
    fn test_fired_once_cancels_its_subscription() {
        let emitter = Emitter::<TestEvent>::new();
        let subscription = emitter.once::<Hello>(|_| {});
        let global = emitter.once_any(|_| {});

        emitter.emit::<Hello>(()).unwrap();

        assert!(subscription.is_cancelled());
        assert!(global.is_cancelled());
        assert_eq!(emitter.handler_count::<Hello>(), 0);
        assert_eq!(emitter.any_handler_count(), 0);
    }

    #[test]
    fn test_panicking_once_is_still_removed() {
        let emitter = Emitter::<TestEvent>::new();
        emitter.once::<Hello>(|_| panic!("handler failed"));

        let result = catch_unwind(AssertUnwindSafe(|| emitter.emit::<Hello>(())));
        assert!(result.is_err());
        assert_eq!(emitter.handler_count::<Hello>(), 0);

        emitter.emit::<Hello>(()).unwrap();
    }

    #[test]
    fn test_once_ignores_other_kinds() {
        let emitter = Emitter::<TestEvent>::new();
        let calls = log();

        let c = Arc::clone(&calls);
        emitter.once::<Count>(move |n| push(&c, n.to_string()));

        emitter.emit::<Hello>(()).unwrap();
        emitter.emit::<Count>(5).unwrap();

        assert_eq!(*calls.lock(), vec!["5"]);
    }

    #[test]
    fn test_reentrant_emit_from_once_does_not_refire() {
        let emitter = Emitter::<TestEvent>::new();
        let calls = log();

        let c = Arc::clone(&calls);
        let inner = emitter.clone();
        emitter.once::<Count>(move |n| {
            push(&c, n.to_string());
            inner.emit::<Count>(n + 1).unwrap();
        });

        emitter.emit::<Count>(1).unwrap();
        assert_eq!(*calls.lock(), vec!["1"]);
    }

    #[test]
    fn test_once_any() {
        let emitter = Emitter::<TestEvent>::new();
        let calls = log();

        let c = Arc::clone(&calls);
        emitter.once_any(move |event: &TestEvent| push(&c, event.kind().to_string()));

        emitter.emit::<Hello>(()).unwrap();
        emitter.emit::<Count>(1).unwrap();

        assert_eq!(*calls.lock(), vec!["hello"]);
        assert_eq!(emitter.any_handler_count(), 0);
    }

    #[test]
    fn test_cancelled_once_never_fires() {
        let emitter = Emitter::<TestEvent>::new();
        let calls = log();

        let c = Arc::clone(&calls);
        emitter.once::<Hello>(move |_| push(&c, "h")).cancel();
        emitter.emit::<Hello>(()).unwrap();

        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_removal_during_dispatch_does_not_affect_snapshot() {
        let emitter = Emitter::<TestEvent>::new();
        let calls = log();

        let c = Arc::clone(&calls);
        let second = Handler::new(move |_: &()| push(&c, "second"));

        let inner = emitter.clone();
        let second_clone = second.clone();
        let c = Arc::clone(&calls);
        emitter.on::<Hello>(move |_| {
            push(&c, "first");
            inner.off::<Hello>(&second_clone);
        });
        emitter.on_handler::<Hello>(&second);

        emitter.emit::<Hello>(()).unwrap();
        assert_eq!(*calls.lock(), vec!["first", "second"]);

        calls.lock().clear();
        emitter.emit::<Hello>(()).unwrap();
        assert_eq!(*calls.lock(), vec!["first"]);
    }

    #[test]
    fn test_registration_during_dispatch_applies_to_next_pass() {
        let emitter = Emitter::<TestEvent>::new();
        let calls = log();

        let inner = emitter.clone();
        let c = Arc::clone(&calls);
        emitter.once::<Hello>(move |_| {
            let c = Arc::clone(&c);
            inner.on::<Hello>(move |_| push(&c, "late"));
        });

        emitter.emit::<Hello>(()).unwrap();
        assert!(calls.lock().is_empty());

        emitter.emit::<Hello>(()).unwrap();
        assert_eq!(*calls.lock(), vec!["late"]);
    }

    #[test]
    fn test_panicking_handler_aborts_pass_and_emitter_survives() {
        let emitter = Emitter::<TestEvent>::new();
        let calls = log();

        emitter.on::<Hello>(|_| panic!("handler failed"));
        let c = Arc::clone(&calls);
        emitter.on::<Hello>(move |_| push(&c, "after"));
        let c = Arc::clone(&calls);
        emitter.on::<Count>(move |_| push(&c, "count"));

        let result = catch_unwind(AssertUnwindSafe(|| emitter.emit::<Hello>(())));
        assert!(result.is_err());
        assert!(calls.lock().is_empty());

        emitter.emit::<Count>(1).unwrap();
        assert_eq!(*calls.lock(), vec!["count"]);
    }

    #[test]
    fn test_clear_keeps_relay() {
        let connector = MockConnector::default();
        let emitter = Emitter::<TestEvent>::builder()
            .connector(connector.clone())
            .options(EmitterOptions::new().relay_channel("room"))
            .build()
            .unwrap();
        emitter.on::<Hello>(|_| {});
        emitter.on_any(|_| {});

        emitter.clear();

        assert_eq!(emitter.handler_count::<Hello>(), 0);
        assert_eq!(emitter.any_handler_count(), 0);
        assert_eq!(emitter.relay_channel().as_deref(), Some("room"));
    }

    #[test]
    fn test_signal_removes_registrations() {
        let emitter = Emitter::<TestEvent>::new();
        let signal = AbortSignal::new();
        let calls = log();

        let c = Arc::clone(&calls);
        emitter.with_signal(&signal).on::<Hello>(move |_| push(&c, "h"));
        let c = Arc::clone(&calls);
        emitter.with_signal(&signal).on_any(move |_| push(&c, "g"));

        emitter.emit::<Hello>(()).unwrap();
        signal.abort();
        emitter.emit::<Hello>(()).unwrap();

        assert_eq!(*calls.lock(), vec!["h", "g"]);
        assert_eq!(emitter.handler_count::<Hello>(), 0);
        assert_eq!(emitter.any_handler_count(), 0);
    }

    #[test]
    fn test_removed_registrations_release_abort_callbacks() {
        let emitter = Emitter::<TestEvent>::new();
        let signal = AbortSignal::new();
        let registrar = emitter.with_signal(&signal);

        for _ in 0..1000 {
            registrar.on::<Hello>(|_| {}).cancel();
        }
        assert_eq!(signal.pending(), 0);

        registrar.once::<Hello>(|_| {});
        emitter.emit::<Hello>(()).unwrap();
        assert_eq!(signal.pending(), 0);

        registrar.on::<Hello>(|_| {});
        registrar.on_any(|_| {});
        assert_eq!(signal.pending(), 2);
        emitter.clear();
        assert_eq!(signal.pending(), 0);

        registrar.on::<Count>(|_| {});
        emitter.off_all::<Count>();
        assert_eq!(signal.pending(), 0);

        let handler = Handler::new(|_: &()| {});
        registrar.on_handler::<Hello>(&handler);
        registrar.on_handler::<Hello>(&handler);
        assert_eq!(signal.pending(), 2);
        emitter.off::<Hello>(&handler);
        assert_eq!(signal.pending(), 0);
    }

    #[test]
    fn test_dropped_emitter_releases_abort_callbacks() {
        let emitter = Emitter::<TestEvent>::new();
        let signal = AbortSignal::new();
        emitter.with_signal(&signal).on::<Hello>(|_| {});
        emitter.with_signal(&signal).on_any(|_| {});
        assert_eq!(signal.pending(), 2);

        drop(emitter);
        assert_eq!(signal.pending(), 0);
        signal.abort();
    }

    async fn settle(baseline: usize) -> usize {
        let metrics = tokio::runtime::Handle::current().metrics();
        for _ in 0..200 {
            if metrics.num_alive_tasks() == baseline {
                break;
            }
            tokio::task::yield_now().await;
        }
        metrics.num_alive_tasks()
    }

    #[tokio::test]
    async fn test_removed_registrations_stop_token_watchers() {
        let baseline = tokio::runtime::Handle::current().metrics().num_alive_tasks();
        let token = CancellationToken::new();
        let emitter = Emitter::<TestEvent>::new();

        for _ in 0..100 {
            emitter.with_signal(&token).on::<Hello>(|_| {}).cancel();
        }
        assert_eq!(settle(baseline).await, baseline);

        let fired = emitter.with_signal(&token).once::<Hello>(|_| {});
        emitter.emit::<Hello>(()).unwrap();
        assert!(fired.is_cancelled());
        assert_eq!(settle(baseline).await, baseline);

        emitter.with_signal(&token).on::<Count>(|_| {});
        emitter.with_signal(&token).on_any(|_| {});
        emitter.clear();
        assert_eq!(settle(baseline).await, baseline);

        for _ in 0..10 {
            emitter.with_signal(&token).on::<Hello>(|_| {});
        }
        drop(emitter);
        assert_eq!(settle(baseline).await, baseline);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_aborted_signal_registers_nothing() {
        let emitter = Emitter::<TestEvent>::new();
        let signal = AbortSignal::new();
        signal.abort();

        let subscription = emitter.with_signal(&signal).on::<Hello>(|_| {});
        emitter.with_signal(&signal).once_any(|_| {});

        assert!(subscription.is_cancelled());
        assert_eq!(emitter.handler_count::<Hello>(), 0);
        assert_eq!(emitter.any_handler_count(), 0);
    }

    #[test]
    fn test_emit_forwards_to_relay_and_dispatches() {
        let connector = MockConnector::default();
        let emitter = Emitter::<TestEvent>::builder()
            .connector(connector.clone())
            .options(EmitterOptions::new().relay_channel("room"))
            .build()
            .unwrap();
        let calls = log();
        let c = Arc::clone(&calls);
        emitter.on::<Message>(move |text| push(&c, text.as_str()));

        emitter.emit::<Message>("hi".into()).unwrap();

        let endpoint = connector.endpoint(0);
        assert_eq!(*endpoint.sent.lock(), vec![RelayMessage::new("message", json!("hi"))]);
        assert_eq!(*calls.lock(), vec!["hi"]);
    }

    #[test]
    fn test_relay_failure_still_dispatches_locally() {
        let connector = MockConnector {
            fail_sends: true,
            ..Default::default()
        };
        let emitter = Emitter::<TestEvent>::builder()
            .connector(connector)
            .options(EmitterOptions::new().relay_channel("room"))
            .build()
            .unwrap();
        let calls = log();
        let c = Arc::clone(&calls);
        emitter.on::<Hello>(move |_| push(&c, "h"));

        let err = emitter.emit::<Hello>(()).unwrap_err();
        assert!(matches!(err, EmitterError::Relay(RelayError::SendFailed(_))));
        assert_eq!(*calls.lock(), vec!["h"]);
    }

    #[test]
    fn test_schema_without_codec_reports_unsupported() {
        let emitter = Emitter::<LocalOnly>::builder()
            .connector(MockConnector::default())
            .options(EmitterOptions::new().relay_channel("room"))
            .build()
            .unwrap();
        let calls = log();
        let c = Arc::clone(&calls);
        emitter.on_any(move |_| push(&c, "local"));

        let err = emitter.emit_event(LocalOnly).unwrap_err();
        assert!(matches!(err, EmitterError::Relay(RelayError::Unsupported { .. })));
        assert_eq!(*calls.lock(), vec!["local"]);
    }

    #[test]
    fn test_inbound_messages_dispatch_without_resend() {
        let connector = MockConnector::default();
        let emitter = Emitter::<TestEvent>::builder()
            .connector(connector.clone())
            .options(EmitterOptions::new().relay_channel("room"))
            .build()
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        emitter.on_any(move |event: &TestEvent| s.lock().push(event.clone()));

        let endpoint = connector.endpoint(0);
        endpoint.deliver(RelayMessage::new("count", json!(4)));
        endpoint.deliver(RelayMessage::new("count", json!("not a number")));
        endpoint.deliver(RelayMessage::new("unknown", Value::Null));

        assert_eq!(*seen.lock(), vec![TestEvent::Count(4)]);
        assert!(endpoint.sent.lock().is_empty());
    }

    #[test]
    fn test_set_options_replaces_endpoint() {
        let connector = MockConnector::default();
        let emitter = Emitter::<TestEvent>::builder()
            .connector(connector.clone())
            .options(EmitterOptions::new().relay_channel("a"))
            .build()
            .unwrap();
        let calls = log();
        let c = Arc::clone(&calls);
        emitter.on::<Message>(move |text| push(&c, text.as_str()));

        emitter
            .set_options(EmitterOptions::new().relay_channel("b"))
            .unwrap();
        assert_eq!(emitter.relay_channel().as_deref(), Some("b"));

        let old = connector.endpoint(0);
        let new = connector.endpoint(1);
        old.deliver(RelayMessage::new("message", json!("stale")));
        new.deliver(RelayMessage::new("message", json!("fresh")));
        emitter.emit::<Message>("out".into()).unwrap();

        assert_eq!(*calls.lock(), vec!["fresh", "out"]);
        assert!(old.sent.lock().is_empty());
        assert_eq!(new.sent.lock().len(), 1);
    }

    #[test]
    fn test_set_options_without_channel_disables_relay() {
        let connector = MockConnector::default();
        let emitter = Emitter::<TestEvent>::builder()
            .connector(connector.clone())
            .options(EmitterOptions::new().relay_channel("a"))
            .build()
            .unwrap();
        emitter.on::<Hello>(|_| {});

        emitter.set_options(EmitterOptions::new()).unwrap();
        emitter.emit::<Hello>(()).unwrap();

        assert_eq!(emitter.relay_channel(), None);
        assert!(connector.endpoint(0).sent.lock().is_empty());
        assert_eq!(emitter.handler_count::<Hello>(), 1);
    }

    #[test]
    fn test_failed_join_keeps_current_relay() {
        let connector = MockConnector {
            refuse: Some("b".into()),
            ..Default::default()
        };
        let emitter = Emitter::<TestEvent>::builder()
            .connector(connector.clone())
            .options(EmitterOptions::new().relay_channel("a"))
            .build()
            .unwrap();
        let calls = log();
        let c = Arc::clone(&calls);
        emitter.on::<Message>(move |text| push(&c, text.as_str()));

        let err = emitter
            .set_options(EmitterOptions::new().relay_channel("b"))
            .unwrap_err();
        assert!(matches!(
            err,
            EmitterError::Relay(RelayError::Unavailable { ref channel, .. }) if channel == "b"
        ));
        assert_eq!(emitter.relay_channel().as_deref(), Some("a"));

        let endpoint = connector.endpoint(0);
        endpoint.deliver(RelayMessage::new("message", json!("still here")));
        emitter.emit::<Message>("out".into()).unwrap();

        assert_eq!(*calls.lock(), vec!["still here", "out"]);
        assert_eq!(endpoint.sent.lock().len(), 1);
    }

    #[test]
    fn test_channel_without_connector_fails() {
        let emitter = Emitter::<TestEvent>::new();
        let err = emitter
            .set_options(EmitterOptions::new().relay_channel("room"))
            .unwrap_err();
        assert!(matches!(
            err,
            EmitterError::Relay(RelayError::NoConnector { ref channel }) if channel == "room"
        ));
        assert_eq!(emitter.relay_channel(), None);
    }
}
