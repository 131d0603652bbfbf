//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffer size, timeouts, poll interval)
//! - Check that an enabled dev server actually names a script
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::BridgeConfig;

/// A single semantic problem with the configuration.
#[derive(Debug)]
pub enum ValidationError {
    InvalidBindAddress(String),
    UnsupportedScheme(String),
    EmptyHost,
    ZeroPort,
    ZeroBufferSize,
    ZeroRequestTimeout,
    MissingScript,
    ZeroPollInterval,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidBindAddress(addr) => {
                write!(f, "listener.bind_address '{}' is not a socket address", addr)
            }
            ValidationError::UnsupportedScheme(scheme) => {
                write!(f, "proxy.scheme '{}' is not supported (use http or https)", scheme)
            }
            ValidationError::EmptyHost => write!(f, "proxy.host must not be empty"),
            ValidationError::ZeroPort => write!(f, "proxy.port must be non-zero"),
            ValidationError::ZeroBufferSize => write!(f, "proxy.buffer_size must be non-zero"),
            ValidationError::ZeroRequestTimeout => {
                write!(f, "proxy.request_timeout_secs must be non-zero")
            }
            ValidationError::MissingScript => {
                write!(f, "dev_server.script must be set when dev_server.enabled is true")
            }
            ValidationError::ZeroPollInterval => {
                write!(f, "watchdog.poll_interval_ms must be non-zero")
            }
        }
    }
}

/// Validate the configuration, collecting every problem found.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    match config.proxy.scheme.as_str() {
        "http" | "https" => {}
        other => errors.push(ValidationError::UnsupportedScheme(other.to_string())),
    }
    if config.proxy.host.is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if config.proxy.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }
    if config.proxy.buffer_size == 0 {
        errors.push(ValidationError::ZeroBufferSize);
    }
    if config.proxy.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }

    if config.dev_server.enabled && config.dev_server.script.is_empty() {
        errors.push(ValidationError::MissingScript);
    }

    if config.watchdog.poll_interval_ms == 0 {
        errors.push(ValidationError::ZeroPollInterval);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&BridgeConfig::default()).is_ok());
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = BridgeConfig::default();
        config.proxy.scheme = "ftp".to_string();
        config.proxy.host.clear();
        config.proxy.buffer_size = 0;
        config.dev_server.enabled = true;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }
}
