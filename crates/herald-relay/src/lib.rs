//! In-process relay channels for Herald.
//!
//! [`LocalConnector`] implements the relay contract from `herald-core` with
//! named broadcast channels shared by every emitter in the process, whatever
//! task or thread it lives on.
//!
//! ```text
//!              HUB_REGISTRY
//!          "room" ──▶ Hub (broadcast)
//!                  ▲     │      │
//!             send │     ▼      ▼
//!         ┌──────────┐ ┌──────────┐ ┌──────────┐
//!         │endpoint 1│ │endpoint 2│ │endpoint 3│
//!         └──────────┘ └──────────┘ └──────────┘
//! ```
//!
//! Each endpoint runs one receive task, so its emitter sees inbound messages
//! one at a time. An endpoint never receives its own messages. Delivery is
//! best effort: a receiver that falls more than the channel capacity behind
//! loses the oldest messages.
//!
//! # Example
//!
//! ```rust,ignore
//! use herald_core::{Emitter, EmitterOptions};
//! use herald_relay::LocalConnector;
//!
//! let emitter = Emitter::<ChatEvent>::builder()
//!     .connector(LocalConnector::new())
//!     .options(EmitterOptions::new().relay_channel("room"))
//!     .build()?;
//! ```

mod hub;
mod local;

pub use hub::{DEFAULT_CAPACITY, endpoint_count};
pub use local::{LocalChannel, LocalConnector};
