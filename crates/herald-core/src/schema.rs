//! Event schema traits.
//!
//! A schema is a caller-defined enum whose variants form the closed set of
//! event kinds. Three traits describe it:
//!
//! - [`EventSchema`] - implemented by the enum itself. A value of the enum is
//!   the tagged `{kind, payload}` union that global handlers receive.
//! - [`EventName`] - implemented by the companion kind enum, the comparable key
//!   handlers are registered under.
//! - [`EventKind`] - implemented by one zero-sized marker per kind, tying the
//!   kind to its payload type so handlers and `emit` are typed per kind.
//!
//! # Derive Macro
//!
//! All three are normally generated with `#[derive(Events)]`:
//!
//! ```rust,ignore
//! use herald::Events;
//!
//! #[derive(Clone, Debug, Events)]
//! pub enum ChatEvent {
//!     Hello,
//!     Message(String),
//!     #[event(name = "user-joined")]
//!     Joined(User),
//! }
//!
//! // Generated: `ChatEventKind` and the markers `chat_event::{Hello, Message, Joined}`.
//! emitter.on::<chat_event::Message>(|text| println!("{text}"));
//! emitter.emit::<chat_event::Message>("hi".to_string())?;
//! ```

use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::error::{RelayError, RelayResult};
use crate::relay::RelayMessage;

/// The key of one event kind.
///
/// Kind enums are plain `Copy` values; [`name`](EventName::name) is the stable
/// string used in timeout messages and on the relay wire.
pub trait EventName: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {
    /// Returns the wire name of this kind.
    fn name(&self) -> &'static str;

    /// Looks up a kind by its wire name.
    fn from_name(name: &str) -> Option<Self>;

    /// Returns every kind in declaration order.
    fn all() -> &'static [Self];
}

/// A closed set of events with their payloads.
pub trait EventSchema: Clone + Send + Sync + 'static {
    /// The kind enum for this schema.
    type Kind: EventName;

    /// Returns the kind of this occurrence.
    fn kind(&self) -> Self::Kind;

    /// Encodes this event as a relay message.
    ///
    /// The default rejects relaying; schemas generated without the `local`
    /// flag override it with a JSON codec.
    fn to_message(&self) -> RelayResult<RelayMessage> {
        Err(RelayError::Unsupported {
            event: self.kind().name().to_string(),
        })
    }

    /// Decodes an event received from a relay.
    fn from_message(message: RelayMessage) -> RelayResult<Self> {
        Err(RelayError::Unsupported {
            event: message.event,
        })
    }
}

/// Marker type for a single event kind of schema `S`.
pub trait EventKind<S: EventSchema>: 'static {
    /// Payload carried by this kind. Kinds without data use `()`.
    type Payload: Clone + Send + Sync + 'static;

    /// The kind this marker stands for.
    const KIND: S::Kind;

    /// Builds the schema value for a payload of this kind.
    fn wrap(payload: Self::Payload) -> S;

    /// Borrows the payload if `event` is of this kind.
    fn payload(event: &S) -> Option<&Self::Payload>;
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! A hand-written schema used by the unit tests of this crate.

    use std::fmt;

    use serde_json::Value;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum TestEvent {
        Hello,
        Message(String),
        Count(u32),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum TestKind {
        Hello,
        Message,
        Count,
    }

    impl fmt::Display for TestKind {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.name())
        }
    }

    impl EventName for TestKind {
        fn name(&self) -> &'static str {
            match self {
                Self::Hello => "hello",
                Self::Message => "message",
                Self::Count => "count",
            }
        }

        fn from_name(name: &str) -> Option<Self> {
            Self::all().iter().copied().find(|kind| kind.name() == name)
        }

        fn all() -> &'static [Self] {
            &[Self::Hello, Self::Message, Self::Count]
        }
    }

    impl EventSchema for TestEvent {
        type Kind = TestKind;

        fn kind(&self) -> TestKind {
            match self {
                Self::Hello => TestKind::Hello,
                Self::Message(_) => TestKind::Message,
                Self::Count(_) => TestKind::Count,
            }
        }

        fn to_message(&self) -> RelayResult<RelayMessage> {
            let payload = match self {
                Self::Hello => Value::Null,
                Self::Message(text) => Value::from(text.as_str()),
                Self::Count(n) => Value::from(*n),
            };
            Ok(RelayMessage::new(self.kind().name(), payload))
        }

        fn from_message(message: RelayMessage) -> RelayResult<Self> {
            let decode = |reason: &str| RelayError::decode(message.event.clone(), reason);
            match TestKind::from_name(&message.event) {
                Some(TestKind::Hello) => Ok(Self::Hello),
                Some(TestKind::Message) => message
                    .payload
                    .as_str()
                    .map(|text| Self::Message(text.to_string()))
                    .ok_or_else(|| decode("expected a string")),
                Some(TestKind::Count) => message
                    .payload
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .map(Self::Count)
                    .ok_or_else(|| decode("expected a u32")),
                None => Err(RelayError::UnknownEvent {
                    event: message.event.clone(),
                }),
            }
        }
    }

    pub struct Hello;
    pub struct Message;
    pub struct Count;

    impl EventKind<TestEvent> for Hello {
        type Payload = ();
        const KIND: TestKind = TestKind::Hello;

        fn wrap(_: ()) -> TestEvent {
            TestEvent::Hello
        }

        fn payload(event: &TestEvent) -> Option<&()> {
            match event {
                TestEvent::Hello => Some(&()),
                _ => None,
            }
        }
    }

    impl EventKind<TestEvent> for Message {
        type Payload = String;
        const KIND: TestKind = TestKind::Message;

        fn wrap(payload: String) -> TestEvent {
            TestEvent::Message(payload)
        }

        fn payload(event: &TestEvent) -> Option<&String> {
            match event {
                TestEvent::Message(text) => Some(text),
                _ => None,
            }
        }
    }

    impl EventKind<TestEvent> for Count {
        type Payload = u32;
        const KIND: TestKind = TestKind::Count;

        fn wrap(payload: u32) -> TestEvent {
            TestEvent::Count(payload)
        }

        fn payload(event: &TestEvent) -> Option<&u32> {
            match event {
                TestEvent::Count(n) => Some(n),
                _ => None,
            }
        }
    }

    /// Same events, but without a relay codec.
    #[derive(Debug, Clone)]
    pub struct LocalOnly;

    impl EventSchema for LocalOnly {
        type Kind = TestKind;

        fn kind(&self) -> TestKind {
            TestKind::Hello
        }
    }
}
