//! In-process relay endpoints.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use herald_core::{
    RelayCallback, RelayConnector, RelayError, RelayMessage, RelayResult, RelayTransport,
};
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::hub::{DEFAULT_CAPACITY, Frame, Hub, get_or_create_hub};

/// Opens [`LocalChannel`] endpoints.
///
/// Connecting requires a running tokio runtime; the endpoint's receive task
/// is spawned on it.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    capacity: usize,
}

impl Default for LocalConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalConnector {
    /// Creates a connector with the default channel capacity.
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// Creates a connector whose new channels buffer `capacity` messages per
    /// receiver.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }
}

impl RelayConnector for LocalConnector {
    fn connect(&self, channel: &str) -> RelayResult<Arc<dyn RelayTransport>> {
        Ok(Arc::new(LocalChannel::connect(channel, self.capacity)?))
    }
}

/// One endpoint attached to a named in-process channel.
///
/// Dropping it stops its receive task and detaches it from the channel.
pub struct LocalChannel {
    id: u64,
    hub: Arc<Hub>,
    callback: Arc<Mutex<Option<RelayCallback>>>,
    shutdown: CancellationToken,
}

impl LocalChannel {
    /// Attaches a new endpoint to `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Unavailable`] when called outside a tokio runtime.
    pub fn connect(channel: &str, capacity: usize) -> RelayResult<Self> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| RelayError::unavailable(channel, "no tokio runtime is running"))?;

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let hub = get_or_create_hub(channel, capacity);
        let receiver = hub.subscribe();
        let callback = Arc::new(Mutex::new(None));
        let shutdown = CancellationToken::new();

        hub.attach();
        runtime.spawn(receive_loop(
            id,
            channel.to_string(),
            receiver,
            Arc::clone(&callback),
            shutdown.clone(),
        ));
        debug!(channel, endpoint = id, "Relay endpoint attached");

        Ok(Self {
            id,
            hub,
            callback,
            shutdown,
        })
    }
}

impl RelayTransport for LocalChannel {
    fn channel(&self) -> &str {
        self.hub.name()
    }

    fn send(&self, message: RelayMessage) -> RelayResult<()> {
        let body = serde_json::to_string(&message)
            .map_err(|err| RelayError::encode(message.event.as_str(), err))?;
        let delivered = self.hub.publish(Frame {
            origin: self.id,
            body: Arc::from(body),
        });
        trace!(
            channel = self.hub.name(),
            event = %message.event,
            receivers = delivered.saturating_sub(1),
            "Relay message sent"
        );
        Ok(())
    }

    fn on_receive(&self, callback: RelayCallback) {
        *self.callback.lock() = Some(callback);
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.hub.detach();
        debug!(channel = self.hub.name(), endpoint = self.id, "Relay endpoint detached");
    }
}

impl fmt::Debug for LocalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChannel")
            .field("id", &self.id)
            .field("channel", &self.hub.name())
            .finish()
    }
}

async fn receive_loop(
    id: u64,
    channel: String,
    mut receiver: broadcast::Receiver<Frame>,
    callback: Arc<Mutex<Option<RelayCallback>>>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            frame = receiver.recv() => match frame {
                Ok(frame) if frame.origin == id => {}
                Ok(frame) => deliver(&channel, &callback, &frame),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %channel, skipped, "Relay endpoint fell behind, messages dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    trace!(channel = %channel, endpoint = id, "Relay receive loop stopped");
}

fn deliver(channel: &str, callback: &Mutex<Option<RelayCallback>>, frame: &Frame) {
    let message: RelayMessage = match serde_json::from_str(&frame.body) {
        Ok(message) => message,
        Err(err) => {
            warn!(channel, error = %err, "Dropping malformed relay frame");
            return;
        }
    };

    let Some(callback) = callback.lock().clone() else {
        trace!(channel, event = %message.event, "No receiver installed, dropping message");
        return;
    };

    if catch_unwind(AssertUnwindSafe(|| callback(message))).is_err() {
        error!(channel, "Relay receiver panicked");
    }
}
