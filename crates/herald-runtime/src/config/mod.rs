//! Configuration loading and validation.
//!
//! A [`HeraldConfig`] carries the relay channel emitters join at startup and
//! the logging setup. It is assembled by [`ConfigLoader`] from files,
//! `HERALD_*` environment variables and programmatic defaults.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    HeraldConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, RelayConfig,
    SpanEventConfig,
};
pub use validation::{validate_channel, validate_config};
