//! Relay contracts.
//!
//! A relay mirrors locally emitted events to other emitters sharing the same
//! channel identifier, possibly in other threads or tasks, and hands their
//! events back to this one. The core only depends on the two traits below;
//! concrete transports live in `herald-relay`.
//!
//! ```text
//! ┌──────────┐ send  ┌───────────────┐ deliver ┌──────────┐
//! │ Emitter A│──────▶│ channel "room"│────────▶│ Emitter B│
//! └──────────┘       └───────────────┘         └──────────┘
//! ```
//!
//! Transports are best effort and fire-and-forget. They must not deliver an
//! endpoint's own messages back to it; the emitter does not guard against an
//! echoing transport.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayResult;

/// The wire shape of a relayed event: `{"event": <name>, "payload": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    /// The event name.
    pub event: String,
    /// The event payload; `null` for kinds without data.
    #[serde(default)]
    pub payload: Value,
}

impl RelayMessage {
    /// Creates a new relay message.
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Callback invoked by a transport for every inbound message.
pub type RelayCallback = Arc<dyn Fn(RelayMessage) + Send + Sync>;

/// One endpoint attached to a named relay channel.
///
/// Dropping the endpoint detaches it from the channel.
pub trait RelayTransport: Send + Sync {
    /// The channel this endpoint is attached to.
    fn channel(&self) -> &str;

    /// Sends a message to every other endpoint on the channel.
    fn send(&self, message: RelayMessage) -> RelayResult<()>;

    /// Sets the inbound callback, replacing any previous one.
    ///
    /// Inbound messages are delivered one at a time, never concurrently.
    fn on_receive(&self, callback: RelayCallback);
}

/// Opens relay endpoints by channel identifier.
pub trait RelayConnector: Send + Sync {
    /// Attaches a new endpoint to `channel`.
    fn connect(&self, channel: &str) -> RelayResult<Arc<dyn RelayTransport>>;
}

/// Emitter configuration accepted at construction and by `set_options`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitterOptions {
    /// Relay channel to join. `None` or an empty string disables the relay.
    #[serde(default)]
    pub relay_channel: Option<String>,
}

impl EmitterOptions {
    /// Creates options with no relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relay channel.
    pub fn relay_channel(mut self, channel: impl Into<String>) -> Self {
        self.relay_channel = Some(channel.into());
        self
    }

    /// Returns the effective channel, treating an empty string as absent.
    pub fn channel(&self) -> Option<&str> {
        self.relay_channel.as_deref().filter(|c| !c.is_empty())
    }
}
