//! Unified error types for the Herald core.
//!
//! Handler failures are not represented here: a handler that panics unwinds
//! straight through `emit` to its caller, the same way a direct call would.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

// =============================================================================
// Relay Errors
// =============================================================================

/// Errors raised while mirroring events through a relay transport.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// The event payload could not be serialized for the wire.
    #[error("failed to encode '{event}' for relay: {reason}")]
    Encode {
        /// Name of the event being encoded.
        event: String,
        /// Reason for failure.
        reason: String,
    },

    /// A received payload did not match the schema for its event.
    #[error("failed to decode relayed '{event}': {reason}")]
    Decode {
        /// Name of the event being decoded.
        event: String,
        /// Reason for failure.
        reason: String,
    },

    /// A received message named an event outside the schema.
    #[error("relayed event '{event}' is not part of this schema")]
    UnknownEvent {
        /// The unrecognized event name.
        event: String,
    },

    /// The schema has no relay codec.
    #[error("event '{event}' cannot be relayed: schema has no relay codec")]
    Unsupported {
        /// Name of the event.
        event: String,
    },

    /// A relay channel was configured but the emitter has no connector.
    #[error("no relay connector configured for channel '{channel}'")]
    NoConnector {
        /// The requested channel.
        channel: String,
    },

    /// The transport could not open the channel.
    #[error("relay channel '{channel}' is unavailable: {reason}")]
    Unavailable {
        /// The requested channel.
        channel: String,
        /// Reason for failure.
        reason: String,
    },

    /// The transport rejected an outbound message.
    #[error("failed to send relay message: {0}")]
    SendFailed(String),
}

impl RelayError {
    /// Creates an encode error.
    pub fn encode(event: impl Into<String>, reason: impl ToString) -> Self {
        Self::Encode {
            event: event.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a decode error.
    pub fn decode(event: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            event: event.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates an unavailable-channel error.
    pub fn unavailable(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Emitter Errors
// =============================================================================

/// The awaited event did not occur before the deadline passed.
///
/// `event` is the awaited event name, or `global` when waiting for any event.
/// The message gives the timeout in milliseconds, with a fractional part when
/// the timeout is not a whole number of milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct TimeoutError {
    /// The awaited event name.
    pub event: String,
    /// How long the caller was willing to wait.
    pub timeout: Duration,
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.timeout.as_millis();
        let nanos = self.timeout.subsec_nanos() % 1_000_000;
        write!(f, "Timeout waiting for {} event after {millis}", self.event)?;
        if nanos > 0 {
            let fraction = format!("{nanos:06}");
            write!(f, ".{}", fraction.trim_end_matches('0'))?;
        }
        f.write_str("ms")
    }
}

/// Errors surfaced by [`Emitter`](crate::Emitter) operations.
#[derive(Debug, Clone, Error)]
pub enum EmitterError {
    /// `next` timed out.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// The registration backing a `next` call was removed before the event
    /// arrived (for example by `clear`).
    #[error("stopped waiting for {event} event: its subscription was removed")]
    Closed {
        /// The awaited event name.
        event: String,
    },

    /// The relay failed; local delivery still happened.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl EmitterError {
    /// Returns `true` if this is a `next` timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Result type for emitter operations.
pub type EmitterResult<T> = Result<T, EmitterError>;
