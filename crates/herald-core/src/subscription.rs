//! Subscriptions and external cancellation.
//!
//! Every registration returns a [`Subscription`], an idempotent cancellation
//! handle. Registrations can also be tied to a [`CancelSignal`] so that code
//! holding only the signal can remove them:
//!
//! ```rust,ignore
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! emitter.with_signal(&token).on::<chat_event::Message>(|text| println!("{text}"));
//!
//! token.cancel(); // the handler is removed
//! ```
//!
//! A signal hands back a [`SignalHook`] for every callback it accepts. The
//! registry keeps the hook next to the handler, so removing the handler by any
//! route also withdraws the callback from the signal.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Callback run once when a signal becomes cancelled.
pub type CancelCallback = Box<dyn FnOnce() + Send + 'static>;

/// An externally held capability that can request cancellation.
pub trait CancelSignal: Send + Sync {
    /// Returns `true` once cancellation has been requested.
    fn is_cancelled(&self) -> bool;

    /// Runs `callback` when the signal becomes cancelled, unless the returned
    /// hook is dropped first.
    ///
    /// Implementations must run the callback at most once and must not drop
    /// it silently if cancellation happens concurrently with registration.
    fn on_cancel(&self, callback: CancelCallback) -> SignalHook;
}

/// A callback registration held by a [`CancelSignal`].
///
/// Dropping the hook withdraws the callback.
#[must_use = "dropping a hook withdraws its callback"]
pub struct SignalHook {
    detach: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl SignalHook {
    /// Creates a hook that runs `detach` when dropped.
    pub fn new<F>(detach: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A hook with nothing to withdraw.
    pub fn none() -> Self {
        Self { detach: None }
    }

    /// Returns `true` if dropping this hook withdraws a callback.
    pub fn is_attached(&self) -> bool {
        self.detach.is_some()
    }
}

impl Drop for SignalHook {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for SignalHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalHook")
            .field("attached", &self.is_attached())
            .finish()
    }
}

// =============================================================================
// Subscription
// =============================================================================

struct CancelState {
    cancelled: AtomicBool,
    remove: Box<dyn Fn() + Send + Sync>,
}

/// Handle returned by every registration.
///
/// [`cancel`](Self::cancel) removes the registration; calling it again does
/// nothing. Clones cancel the same registration. Dropping a subscription does
/// **not** cancel it.
#[derive(Clone, Default)]
pub struct Subscription {
    state: Option<Arc<CancelState>>,
}

impl Subscription {
    /// Wraps a removal operation.
    pub fn new<F>(remove: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            state: Some(Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                remove: Box::new(remove),
            })),
        }
    }

    /// A subscription that was never registered. Cancelling it does nothing.
    pub fn noop() -> Self {
        Self { state: None }
    }

    /// Removes the registration. Idempotent.
    pub fn cancel(&self) {
        if let Some(state) = &self.state
            && !state.cancelled.swap(true, Ordering::AcqRel)
        {
            (state.remove)();
        }
    }

    /// Returns `true` if this handle was cancelled or never registered.
    pub fn is_cancelled(&self) -> bool {
        self.state
            .as_ref()
            .is_none_or(|state| state.cancelled.load(Ordering::Acquire))
    }

    fn remove_again(&self) {
        if let Some(state) = &self.state {
            (state.remove)();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("noop", &self.state.is_none())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Registers through `add` and returns the matching cancellation handle.
///
/// Used for both event-scoped and global registrations:
///
/// - If `signal` is already cancelled nothing is added and a no-op
///   subscription is returned.
/// - Otherwise `remove` becomes the subscription's cancellation, wired to
///   `signal` when one is given, and `add` receives the subscription and the
///   signal's hook. `add` must keep the hook for as long as the registration
///   exists.
pub fn subscribe<A, R>(add: A, remove: R, signal: Option<&dyn CancelSignal>) -> Subscription
where
    A: FnOnce(&Subscription, SignalHook),
    R: Fn() + Send + Sync + 'static,
{
    if signal.is_some_and(|signal| signal.is_cancelled()) {
        trace!("Signal already cancelled, skipping registration");
        return Subscription::noop();
    }

    let subscription = Subscription::new(remove);
    let hook = match signal {
        Some(signal) => {
            let on_cancel = subscription.clone();
            signal.on_cancel(Box::new(move || on_cancel.cancel()))
        }
        None => SignalHook::none(),
    };

    add(&subscription, hook);

    // Cancelled before `add` ran, so the removal found nothing to remove.
    if subscription.is_cancelled() {
        subscription.remove_again();
    }
    subscription
}

// =============================================================================
// AbortSignal
// =============================================================================

#[derive(Default)]
struct AbortState {
    aborted: AtomicBool,
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, CancelCallback>>,
}

/// A synchronous cancellation signal.
///
/// Unlike a tokio [`CancellationToken`], callbacks registered here run inside
/// [`abort`](Self::abort) itself, so removal is visible to the very next
/// `emit`.
#[derive(Clone, Default)]
pub struct AbortSignal {
    state: Arc<AbortState>,
}

impl AbortSignal {
    /// Creates a signal that is not yet aborted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts the signal, running every registered callback once, oldest
    /// first.
    pub fn abort(&self) {
        if self.state.aborted.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut callbacks: Vec<_> = std::mem::take(&mut *self.state.callbacks.lock())
            .into_iter()
            .collect();
        callbacks.sort_unstable_by_key(|(id, _)| *id);
        for (_, callback) in callbacks {
            callback();
        }
    }

    /// Returns `true` once [`abort`](Self::abort) has been called.
    pub fn is_aborted(&self) -> bool {
        self.state.aborted.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.state.callbacks.lock().len()
    }
}

fn withdraw(state: &Weak<AbortState>, id: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let callback = state.callbacks.lock().remove(&id);
    // Dropped outside the lock: the callback may own the last subscription.
    drop(callback);
}

impl CancelSignal for AbortSignal {
    fn is_cancelled(&self) -> bool {
        self.is_aborted()
    }

    fn on_cancel(&self, callback: CancelCallback) -> SignalHook {
        {
            let mut callbacks = self.state.callbacks.lock();
            // Checked under the lock: `abort` flips the flag before draining.
            if !self.state.aborted.load(Ordering::Acquire) {
                let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
                callbacks.insert(id, callback);
                let state = Arc::downgrade(&self.state);
                return SignalHook::new(move || withdraw(&state, id));
            }
        }
        callback();
        SignalHook::none()
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

// =============================================================================
// CancellationToken
// =============================================================================

/// The callback runs on a watcher task once the token is cancelled, so the
/// registration disappears shortly after `cancel()` rather than inside it.
/// Dropping the hook stops the watcher.
impl CancelSignal for CancellationToken {
    fn is_cancelled(&self) -> bool {
        CancellationToken::is_cancelled(self)
    }

    fn on_cancel(&self, callback: CancelCallback) -> SignalHook {
        if CancellationToken::is_cancelled(self) {
            callback();
            return SignalHook::none();
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let token = self.clone();
                let released = CancellationToken::new();
                let watch = released.clone();
                handle.spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => callback(),
                        _ = watch.cancelled() => {}
                    }
                });
                SignalHook::new(move || released.cancel())
            }
            Err(_) => {
                warn!("No tokio runtime; cancellation token will not remove this registration");
                SignalHook::none()
            }
        }
    }
}
