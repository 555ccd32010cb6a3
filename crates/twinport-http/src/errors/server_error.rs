//! Server error types
//!
//! Only listener-level failures surface here. Per-connection problems are
//! answered on the wire and logged; they never reach the caller of `serve`.

use crate::config::ConfigError;
use thiserror::Error;

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {message}")]
    Bind { addr: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Create a bind error
    pub fn bind<A: ToString, T: Into<String>>(addr: A, message: T) -> Self {
        ServerError::Bind {
            addr: addr.to_string(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(message: T) -> Self {
        ServerError::Config {
            message: message.into(),
        }
    }

    /// Get error code for consistent reporting
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::Bind { .. } => "SERVER_BIND_FAILED",
            ServerError::Config { .. } => "CONFIGURATION_ERROR",
            ServerError::Io(_) => "IO_ERROR",
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        ServerError::Config {
            message: err.to_string(),
        }
    }
}
