//! Process-wide registry of named channels.
//!
//! Maps each channel name to a live [`Hub`]. Endpoints hold the hub strongly
//! and the registry holds it weakly, so a hub disappears with its last
//! endpoint and the next `connect` starts a fresh one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

/// Messages a receiver may fall behind by before it starts losing them.
pub const DEFAULT_CAPACITY: usize = 256;

/// A serialized relay message tagged with the endpoint that sent it.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub origin: u64,
    pub body: Arc<str>,
}

/// One named channel.
pub(crate) struct Hub {
    name: String,
    sender: broadcast::Sender<Frame>,
    endpoints: AtomicUsize,
}

impl Hub {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.sender.subscribe()
    }

    /// Publishes a frame. Returns how many receivers it was queued for.
    pub fn publish(&self, frame: Frame) -> usize {
        self.sender.send(frame).unwrap_or(0)
    }

    pub fn attach(&self) {
        self.endpoints.fetch_add(1, Ordering::AcqRel);
    }

    pub fn detach(&self) {
        self.endpoints.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        let mut registry = HUB_REGISTRY.lock();
        // A newer hub may already be registered under the same name.
        if registry
            .get(&self.name)
            .is_some_and(|weak| weak.strong_count() == 0)
        {
            registry.remove(&self.name);
        }
        debug!(channel = %self.name, "Relay channel closed");
    }
}

static HUB_REGISTRY: LazyLock<Mutex<HashMap<String, Weak<Hub>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Returns the live hub for `name`, creating it if needed.
///
/// `capacity` only applies when a new hub is created.
pub(crate) fn get_or_create_hub(name: &str, capacity: usize) -> Arc<Hub> {
    let mut registry = HUB_REGISTRY.lock();
    if let Some(weak) = registry.get(name)
        && let Some(hub) = weak.upgrade()
    {
        return hub;
    }

    let (sender, _) = broadcast::channel(capacity.max(1));
    let hub = Arc::new(Hub {
        name: name.to_string(),
        sender,
        endpoints: AtomicUsize::new(0),
    });
    registry.insert(name.to_string(), Arc::downgrade(&hub));
    debug!(channel = name, capacity, "Relay channel opened");

    hub
}

/// Number of live endpoints attached to `channel`.
pub fn endpoint_count(channel: &str) -> usize {
    let hub = HUB_REGISTRY.lock().get(channel).and_then(Weak::upgrade);
    hub.map_or(0, |hub| hub.endpoints.load(Ordering::Acquire))
}
