//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{HeraldConfig, LogFormat, LogOutput, LoggingConfig, RelayConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &HeraldConfig) -> ConfigResult<()> {
    validate_relay_config(&config.relay)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates relay settings.
fn validate_relay_config(relay: &RelayConfig) -> ConfigResult<()> {
    if let Some(channel) = &relay.channel
        && !channel.is_empty()
    {
        validate_channel(channel)?;
    }

    if relay.capacity == 0 {
        return Err(ConfigError::validation(
            "Relay capacity must be greater than 0",
        ));
    }

    Ok(())
}

/// Validates a relay channel name.
///
/// An empty name means "no relay" and is handled by the caller.
pub fn validate_channel(channel: &str) -> ConfigResult<()> {
    if channel.trim().is_empty() {
        return Err(ConfigError::invalid_channel(channel, "name is blank"));
    }

    if channel.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid_channel(
            channel,
            "name cannot contain whitespace",
        ));
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "JSON log format requires the `json-log` feature",
        ));
    }

    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(['=', ',', ' ']) {
            return Err(ConfigError::validation(format!(
                "Invalid module name in logging filters: '{module}'"
            )));
        }
    }

    Ok(())
}
