//! Configuration errors and validation logic

use super::ServerConfig;
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration validation failed: {message}")]
    ValidationFailed { message: String },
}

impl ConfigError {
    pub fn validation_failed<T: Into<String>>(message: T) -> Self {
        ConfigError::ValidationFailed {
            message: message.into(),
        }
    }
}

impl ServerConfig {
    /// Validate the server configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation_failed("Host must not be empty"));
        }

        if self.max_header_size == 0 {
            return Err(ConfigError::validation_failed(
                "Maximum header size must be greater than 0",
            ));
        }

        if self.max_body_size == 0 {
            return Err(ConfigError::validation_failed(
                "Maximum body size must be greater than 0",
            ));
        }

        if self.shutdown_timeout_secs == 0 {
            return Err(ConfigError::validation_failed(
                "Shutdown timeout must be greater than 0",
            ));
        }

        if self.websocket.max_frame_size > self.websocket.max_message_size {
            return Err(ConfigError::validation_failed(
                "WebSocket frame size must not exceed the message size",
            ));
        }

        self.socket_addr()?;

        Ok(())
    }
}
