//! # twinport-http
//!
//! A small application server that answers plain HTTP and long-lived
//! WebSocket sessions on the same listening socket.
//!
//! This crate provides:
//! - A per-connection dispatcher that decides between HTTP and upgrade
//! - RFC 6455 handshake validation on top of tokio-tungstenite
//! - A session registry with snapshot-based broadcast
//! - Application behavior supplied through the [`Application`] trait
//! - Graceful shutdown handling
//! - Environment-driven configuration and structured logging

// Core modules
pub mod config;
pub mod errors;
pub mod logging;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

// Main server API
pub use config::{ConfigError, ServerConfig, WebSocketSettings};
pub use errors::{ServerError, ServerResult};
pub use server::{Application, BoundServer, Dispatcher, Server};

// Re-export request/response types
pub use request::{Headers, HttpRequest, Method, QueryParams, RequestError};
pub use response::{HttpResponse, Reply, CONTENT_TYPE_HTML, CONTENT_TYPE_JAVASCRIPT};

// Re-export WebSocket types
pub use websocket::{
    BroadcastResult, Negotiator, RejectionReason, Session, SessionId, SessionRegistry,
    SessionState, WebSocketError, WebSocketMessage, WebSocketResult,
};

// Re-export logging
pub use logging::{init_logging, log_shutdown_info, log_startup_info, FileLog, LoggingConfig};
