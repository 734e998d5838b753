//! Waiting for the next event.
//!
//! [`Emitter::next`] and [`Emitter::next_any`] turn a `once` registration into
//! a future. The registration is made when `next` is called, so an event
//! emitted between the call and the first poll is not missed:
//!
//! ```rust,ignore
//! let hello = emitter.next::<chat_event::Hello>(NextOptions::new().timeout(Duration::from_secs(1)));
//! emitter.emit::<chat_event::Hello>(())?;
//! hello.await?;
//! ```
//!
//! The future resolves exactly once. On timeout the registration is removed
//! before the error is returned; dropping the future removes it as well.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tracing::trace;

use crate::emitter::Emitter;
use crate::error::{EmitterError, EmitterResult, TimeoutError};
use crate::schema::{EventKind, EventName, EventSchema};
use crate::subscription::Subscription;

/// Event name reported when waiting for any event.
pub const GLOBAL_EVENT: &str = "global";

/// Options for [`Emitter::next`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NextOptions {
    /// How long to wait. `None`, zero, or a duration too long to represent
    /// as a deadline waits forever.
    pub timeout: Option<Duration>,
}

impl NextOptions {
    /// Waits without a timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn deadline(&self) -> Option<(Instant, Duration)> {
        let timeout = self.timeout.filter(|timeout| !timeout.is_zero())?;
        Instant::now()
            .checked_add(timeout)
            .map(|deadline| (deadline, timeout))
    }
}

/// Cancels the wrapped subscription when dropped.
struct CancelOnDrop(Subscription);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl<S: EventSchema> Emitter<S> {
    /// Returns a future resolving with the payload of the next `K` event.
    ///
    /// # Errors
    ///
    /// - [`EmitterError::Timeout`] if the timeout elapses first.
    /// - [`EmitterError::Closed`] if the registration is removed by someone
    ///   else, for example by [`clear`](Self::clear).
    ///
    /// A timeout needs a tokio runtime with the time driver enabled.
    pub fn next<K: EventKind<S>>(
        &self,
        options: NextOptions,
    ) -> impl Future<Output = EmitterResult<K::Payload>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let subscription = self.once::<K>(move |payload| {
            let _ = tx.send(payload.clone());
        });
        wait(rx, subscription, K::KIND.name(), options)
    }

    /// Returns a future resolving with the next event of any kind.
    ///
    /// A timeout reports the event name `global`.
    pub fn next_any(
        &self,
        options: NextOptions,
    ) -> impl Future<Output = EmitterResult<S>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let subscription = self.once_any(move |event: &S| {
            let _ = tx.send(event.clone());
        });
        wait(rx, subscription, GLOBAL_EVENT, options)
    }
}

fn wait<T: Send + 'static>(
    rx: oneshot::Receiver<T>,
    subscription: Subscription,
    event: &'static str,
    options: NextOptions,
) -> impl Future<Output = EmitterResult<T>> + Send + 'static {
    let deadline = options.deadline();
    let guard = CancelOnDrop(subscription);

    async move {
        let _guard = guard;
        let received = match deadline {
            Some((deadline, timeout)) => match time::timeout_at(deadline, rx).await {
                Ok(received) => received,
                Err(_) => {
                    trace!(event, ?timeout, "Timed out waiting for event");
                    return Err(TimeoutError {
                        event: event.to_string(),
                        timeout,
                    }
                    .into());
                }
            },
            None => rx.await,
        };
        received.map_err(|_| EmitterError::Closed {
            event: event.to_string(),
        })
    }
}
