//! WebSocket sessions built on tokio-tungstenite

pub mod negotiator;
pub mod registry;
pub mod session;
pub mod types;

pub use negotiator::{Negotiator, Rejected, RejectionReason};
pub use registry::{BroadcastResult, CloseAllResult, RegistryStats, SessionRegistry};
pub use session::{Session, SessionReader};
pub use types::{
    SessionId, SessionIdGenerator, SessionState, WebSocketError, WebSocketMessage,
    WebSocketResult,
};
