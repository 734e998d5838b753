//! # Herald
//!
//! A typed publish/subscribe event emitter with pluggable cross-context relays.
//!
//! ## Overview
//!
//! Describe the events of a component as one enum, derive [`Events`] for it,
//! and use an [`Emitter`] to register handlers and emit payloads. Handlers run
//! synchronously, in registration order, event handlers before global ones.
//! Emitters that join the same relay channel see each other's emissions.
//!
//! ```text
//! ┌──────────┐  emit   ┌───────────┐  dispatch  ┌─────────────────┐
//! │  caller  │────────▶│  Emitter  │───────────▶│ on / once / any │
//! └──────────┘         └─────┬─────┘            └─────────────────┘
//!                            │ relay channel "room"
//!                      ┌─────▼─────┐
//!                      │  Emitter  │ (another task, same process)
//!                      └───────────┘
//! ```
//!
//! - **Core** ([`core`]): schema traits, registry, dispatch, subscriptions,
//!   `next` futures and the relay contract
//! - **Relay** ([`relay`]): in-process named channels
//! - **Runtime** ([`runtime`]): configuration files, environment overrides and
//!   logging setup
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use herald::prelude::*;
//!
//! #[derive(Clone, Debug, Events)]
//! enum ChatEvent {
//!     Hello,
//!     Message(String),
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EmitterError> {
//!     let emitter = herald::create_emitter::<ChatEvent>(EmitterOptions::new())?;
//!
//!     let greeting = emitter.on::<chat_event::Message>(|text| println!("got {text}"));
//!     emitter.emit::<chat_event::Message>("hi".into())?;
//!     greeting.cancel();
//!
//!     let hello = emitter.next::<chat_event::Hello>(NextOptions::new());
//!     emitter.emit::<chat_event::Hello>(())?;
//!     hello.await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use herald_core as core;
pub use herald_relay as relay;
pub use herald_runtime as runtime;

pub use herald_core::{
    AbortSignal, CancelSignal, CancellationToken, Emitter, EmitterBuilder, EmitterError,
    EmitterOptions, EmitterResult, EventKind, EventName, EventSchema, Handler, NextOptions,
    RelayConnector, RelayError, RelayMessage, RelayResult, RelayTransport, SignalHook,
    Subscription, TimeoutError,
};
pub use herald_macros::Events;
pub use herald_relay::LocalConnector;

#[doc(hidden)]
pub use herald_core::__private;

/// Creates an emitter whose relay uses in-process channels.
///
/// Joining a channel requires a running tokio runtime.
pub fn create_emitter<S: EventSchema>(options: EmitterOptions) -> EmitterResult<Emitter<S>> {
    Emitter::builder()
        .connector(LocalConnector::new())
        .options(options)
        .build()
}

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use herald::prelude::*;
/// ```
pub mod prelude {
    pub use herald_core::prelude::*;
    pub use herald_macros::Events;
    pub use herald_relay::LocalConnector;
}
