//! Runtime error types.

use herald_core::EmitterError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while setting up emitters from configuration.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The emitter rejected the configured options.
    #[error(transparent)]
    Emitter(#[from] EmitterError),

    /// A global subscriber was already installed.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
