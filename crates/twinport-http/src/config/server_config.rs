//! Server configuration
//!
//! Everything has a default and can be overridden from `TWINPORT_*`
//! environment variables.

use super::defaults::ServerDefaults;
use super::validation::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;

/// Listener and request limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host or IP address to bind
    pub host: String,
    /// TCP port to bind
    pub port: u16,
    /// Largest accepted request head (request line plus headers) in bytes
    pub max_header_size: usize,
    /// Largest accepted POST body in bytes
    pub max_body_size: usize,
    /// Limits handed to the WebSocket protocol layer
    pub websocket: WebSocketSettings,
    /// How long shutdown waits for open connections to finish, in seconds
    pub shutdown_timeout_secs: u64,
}

/// Frame and message limits for upgraded sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSocketSettings {
    pub max_message_size: usize,
    pub max_frame_size: usize,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            max_message_size: ServerDefaults::WS_MAX_MESSAGE_SIZE,
            max_frame_size: ServerDefaults::WS_MAX_FRAME_SIZE,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: ServerDefaults::HOST.to_string(),
            port: ServerDefaults::PORT,
            max_header_size: ServerDefaults::MAX_HEADER_SIZE,
            max_body_size: ServerDefaults::MAX_BODY_SIZE,
            websocket: WebSocketSettings::default(),
            shutdown_timeout_secs: ServerDefaults::SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Build a configuration bound to the given address, defaults elsewhere
    pub fn bind<H: Into<String>>(host: H, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("TWINPORT_HOST").unwrap_or_else(|_| ServerDefaults::HOST.to_string());

        let port = parse_env(
            "TWINPORT_PORT",
            "port",
            ServerDefaults::PORT,
            "valid TCP port number",
        )?;

        let max_header_size = parse_env(
            "TWINPORT_MAX_HEADER_SIZE",
            "max_header_size",
            ServerDefaults::MAX_HEADER_SIZE,
            "valid number of bytes",
        )?;

        let max_body_size = parse_env(
            "TWINPORT_MAX_BODY_SIZE",
            "max_body_size",
            ServerDefaults::MAX_BODY_SIZE,
            "valid number of bytes",
        )?;

        let max_message_size = parse_env(
            "TWINPORT_WS_MAX_MESSAGE_SIZE",
            "websocket.max_message_size",
            ServerDefaults::WS_MAX_MESSAGE_SIZE,
            "valid number of bytes",
        )?;

        let max_frame_size = parse_env(
            "TWINPORT_WS_MAX_FRAME_SIZE",
            "websocket.max_frame_size",
            ServerDefaults::WS_MAX_FRAME_SIZE,
            "valid number of bytes",
        )?;

        let shutdown_timeout_secs = parse_env(
            "TWINPORT_SHUTDOWN_TIMEOUT",
            "shutdown_timeout_secs",
            ServerDefaults::SHUTDOWN_TIMEOUT_SECS,
            "valid number of seconds",
        )?;

        Ok(ServerConfig {
            host,
            port,
            max_header_size,
            max_body_size,
            websocket: WebSocketSettings {
                max_message_size,
                max_frame_size,
            },
            shutdown_timeout_secs,
        })
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Resolve `host:port` into the address the listener binds
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            field: "host".to_string(),
            value: format!("{}:{}", self.host, self.port),
            expected: "resolvable host and port".to_string(),
        };

        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| invalid())?
            .next()
            .ok_or_else(invalid)
    }
}

fn parse_env<T: FromStr>(
    key: &str,
    field: &str,
    default: T,
    expected: &str,
) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw,
            expected: expected.to_string(),
        }),
        Err(_) => Ok(default),
    }
}
