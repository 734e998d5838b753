//! Herald Runtime - configuration and logging for Herald applications.
//!
//! This crate provides:
//! - Layered configuration (`herald.toml`/`herald.yaml`, `HERALD_*` variables)
//! - Logging setup driven by that configuration
//! - Emitters wired to the in-process relay as configured
//!
//! ```rust,ignore
//! use herald_runtime::config::ConfigLoader;
//!
//! let config = herald_runtime::init(ConfigLoader::new())?;
//! let emitter = herald_runtime::emitter_from_config::<ChatEvent>(&config)?;
//! ```

pub mod config;
pub mod error;
pub mod logging;

use herald_core::{Emitter, EventSchema};
use herald_relay::LocalConnector;
use tracing::debug;

pub use config::{ConfigError, ConfigLoader, ConfigResult, HeraldConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

/// Loads and validates configuration, then initializes logging from it.
pub fn init(loader: ConfigLoader) -> RuntimeResult<HeraldConfig> {
    let config = loader.load()?;
    config::validate_config(&config)?;
    logging::init_from_config(&config.logging);
    debug!("Herald runtime initialized");
    Ok(config)
}

/// Builds an emitter backed by the in-process relay.
///
/// The emitter joins `config.relay.channel` if one is set, which requires a
/// running tokio runtime. It can switch channels later with
/// [`Emitter::set_options`].
pub fn emitter_from_config<S: EventSchema>(config: &HeraldConfig) -> RuntimeResult<Emitter<S>> {
    if let Some(channel) = config.relay.channel.as_deref()
        && !channel.is_empty()
    {
        config::validate_channel(channel)?;
    }

    let emitter = Emitter::builder()
        .connector(LocalConnector::with_capacity(config.relay.capacity))
        .options(config.relay.to_options())
        .build()?;
    Ok(emitter)
}
