//! Procedural macros for the Herald event emitter.
//!
//! This crate provides:
//!
//! - `#[derive(Events)]` - Turns an enum into an event schema
//!
//! # Events Derive Macro
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
//! emitter.on::<chat_event::Joined>(|user| println!("{} joined", user.name));
//! ```

mod events;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives an event schema for an enum.
///
/// Every variant is one event kind. A unit variant carries no payload; a
/// single-field tuple variant carries that field as its payload.
///
/// For an enum `ChatEvent` this generates:
/// - `ChatEventKind` - a `Copy` enum of the kinds, implementing `EventName`
/// - `chat_event` - a module with one marker type per variant, each
///   implementing `EventKind<ChatEvent>`
/// - `impl EventSchema for ChatEvent`, including a JSON relay codec
///
/// # Attributes
///
/// On the enum, `#[events(...)]`:
/// - `crate = "..."` - Path to the `herald` crate (default: `::herald`)
/// - `kind = "..."` - Name of the kind enum (default: `{Enum}Kind`)
/// - `module = "..."` - Name of the marker module (default: snake case of the enum)
/// - `local` - Skip the relay codec; payloads then need not implement serde traits
///
/// On a variant, `#[event(name = "...")]` overrides the event name
/// (default: snake case of the variant).
///
/// # Example
///
/// ```rust,ignore
/// use herald::Events;
///
/// #[derive(Clone, Events)]
/// #[events(kind = "Signal", module = "signals", local)]
/// pub enum AppSignal {
///     Shutdown,
///     Resize(Size),
/// }
///
/// emitter.emit::<signals::Resize>(Size::new(80, 24))?;
/// ```
#[proc_macro_derive(Events, attributes(events, event))]
pub fn derive_events(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match events::derive_events(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
