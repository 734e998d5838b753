//! # Herald Core
//!
//! The core engine of the Herald event emitter.
//!
//! Herald is a typed publish/subscribe emitter. Callers describe their events
//! as one enum, register handlers per event kind or for every event, emit
//! typed payloads, and optionally mirror emissions to other emitters through
//! a named relay channel.
//!
//! ## Components
//!
//! - **Schema** ([`EventSchema`], [`EventName`], [`EventKind`]): the closed set
//!   of event kinds and their payload types, usually derived.
//! - **Registry** ([`HandlerRegistry`]): per-kind handler sets plus a separate
//!   global set, ordered and deduplicated by [`HandlerId`].
//! - **Subscriptions** ([`Subscription`], [`CancelSignal`]): idempotent
//!   cancellation handles, optionally tied to an external signal.
//! - **Dispatch** ([`Emitter`]): snapshot-then-invoke delivery, event handlers
//!   before global handlers.
//! - **Sugar** (`once`, [`Emitter::next`]): self-removing handlers and futures
//!   with optional timeouts.
//! - **Relay** ([`RelayTransport`], [`RelayConnector`]): the narrow contract a
//!   cross-context transport has to meet.
//!
//! ```text
//! ┌────────────┐     ┌─────────────────────┐     ┌───────────────┐
//! │   emit()   │────▶│       Emitter       │────▶│ event handlers│
//! └────────────┘     │ registry + dispatch │────▶│global handlers│
//!                    └─────────┬───────────┘     └───────────────┘
//!                         ▲    │ send
//!                 inbound │    ▼
//!                    ┌─────────────────────┐
//!                    │   RelayTransport    │
//!                    └─────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use herald_core::{Emitter, NextOptions};
//!
//! let emitter = Emitter::<ChatEvent>::new();
//!
//! emitter.on::<chat_event::Message>(|text| println!("message: {text}"));
//! emitter.once::<chat_event::Hello>(|_| println!("first hello"));
//!
//! let next = emitter.next::<chat_event::Message>(NextOptions::new());
//! emitter.emit::<chat_event::Message>("hi".to_string())?;
//! assert_eq!(next.await?, "hi");
//! ```

pub mod emitter;
pub mod error;
pub mod handler;
pub mod next;
pub mod registry;
pub mod relay;
pub mod schema;
pub mod subscription;

pub use emitter::{Emitter, EmitterBuilder, Registrar};
pub use error::{EmitterError, EmitterResult, RelayError, RelayResult, TimeoutError};
pub use handler::{ErasedHandler, Handler, HandlerId};
pub use next::{GLOBAL_EVENT, NextOptions};
pub use registry::{HandlerRegistry, HandlerSet};
pub use relay::{EmitterOptions, RelayCallback, RelayConnector, RelayMessage, RelayTransport};
pub use schema::{EventKind, EventName, EventSchema};
pub use subscription::{
    AbortSignal, CancelCallback, CancelSignal, SignalHook, Subscription, subscribe,
};

pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        AbortSignal, CancelSignal, CancellationToken, Emitter, EmitterError, EmitterOptions,
        EmitterResult, EventKind, EventName, EventSchema, Handler, NextOptions, Subscription,
    };
}

/// Items used by code generated with `#[derive(Events)]`. Not public API.
#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
