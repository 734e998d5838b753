//! Handler values with identity.
//!
//! Closures have no identity in Rust, so a [`Handler`] pairs a callable with a
//! [`HandlerId`]. Clones share the id, which is what makes a second
//! registration of the same handler a no-op and lets `off` find it again:
//!
//! ```rust,ignore
//! let log = Handler::new(|text: &String| println!("{text}"));
//!
//! emitter.on_handler::<chat_event::Message>(&log);
//! emitter.on_handler::<chat_event::Message>(&log); // still one registration
//!
//! emitter.off::<chat_event::Message>(&log);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Allocates a fresh, process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A type-erased handler as stored in the registry: it sees the whole event.
pub type ErasedHandler<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// A cloneable callback with a stable identity.
///
/// `T` is the payload type for event handlers, or the schema type for
/// global handlers.
pub struct Handler<T: ?Sized> {
    id: HandlerId,
    func: Arc<dyn Fn(&T) + Send + Sync>,
}

impl<T: ?Sized> Handler<T> {
    /// Wraps a callback, giving it a new identity.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            id: HandlerId::next(),
            func: Arc::new(f),
        }
    }

    /// Returns this handler's identity.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Invokes the handler.
    pub fn call(&self, value: &T) {
        (self.func)(value)
    }
}

impl<T: ?Sized> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            func: Arc::clone(&self.func),
        }
    }
}

impl<T: ?Sized> PartialEq for Handler<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: ?Sized> Eq for Handler<T> {}

impl<T: ?Sized> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_clones_share_identity() {
        let a = Handler::new(|_: &u32| {});
        let b = a.clone();
        let c = Handler::new(|_: &u32| {});

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_call_invokes_callback() {
        let total = Arc::new(AtomicUsize::new(0));
        let total_clone = Arc::clone(&total);
        let handler = Handler::new(move |n: &usize| {
            total_clone.fetch_add(*n, Ordering::SeqCst);
        });

        handler.call(&3);
        handler.clone().call(&4);

        assert_eq!(total.load(Ordering::SeqCst), 7);
    }
}
