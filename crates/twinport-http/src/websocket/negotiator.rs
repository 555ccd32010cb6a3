//! HTTP-to-WebSocket protocol negotiation
//!
//! The negotiator checks an upgrade request against RFC 6455 §4.2.1 before a
//! single byte is written. Framing and the accept-key digest belong to
//! tokio-tungstenite.

use super::session::{Session, SessionReader};
use super::types::SessionIdGenerator;
use crate::config::WebSocketSettings;
use crate::request::{HttpRequest, Method};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

const SUPPORTED_VERSION: &str = "13";

/// Why a request could not become a session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("WebSocket upgrade requires GET")]
    NotGet,

    #[error("Upgrade header does not contain 'websocket'")]
    MissingUpgrade,

    #[error("Connection header does not contain 'upgrade'")]
    MissingConnectionUpgrade,

    #[error("Unsupported Sec-WebSocket-Version: {0:?}")]
    UnsupportedVersion(String),

    #[error("Missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("Sec-WebSocket-Key is not 16 bytes of base64")]
    InvalidKey,

    #[error("Handshake write failed: {0}")]
    Io(String),
}

/// A refused upgrade.
///
/// `stream` is handed back when nothing has been written yet, so the caller
/// can still answer with an ordinary HTTP response.
pub struct Rejected<S> {
    pub reason: RejectionReason,
    pub stream: Option<S>,
}

impl<S> std::fmt::Debug for Rejected<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rejected")
            .field("reason", &self.reason)
            .field("writable", &self.stream.is_some())
            .finish()
    }
}

/// Turns upgrade requests into sessions
#[derive(Debug)]
pub struct Negotiator {
    ids: SessionIdGenerator,
    ws_config: WebSocketConfig,
}

impl Negotiator {
    pub fn new(settings: &WebSocketSettings) -> Self {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(settings.max_message_size);
        ws_config.max_frame_size = Some(settings.max_frame_size);

        Self {
            ids: SessionIdGenerator::new(),
            ws_config,
        }
    }

    /// Check the handshake headers, returning the client key on success
    pub fn validate(request: &HttpRequest) -> Result<String, RejectionReason> {
        if request.method != Method::Get {
            return Err(RejectionReason::NotGet);
        }

        let headers = &request.headers;
        if !headers.has_token("upgrade", "websocket") {
            return Err(RejectionReason::MissingUpgrade);
        }
        if !headers.has_token("connection", "upgrade") {
            return Err(RejectionReason::MissingConnectionUpgrade);
        }

        let version = headers.get_or("sec-websocket-version", "").trim();
        if version != SUPPORTED_VERSION {
            return Err(RejectionReason::UnsupportedVersion(version.to_string()));
        }

        let key = headers
            .get("sec-websocket-key")
            .map(str::trim)
            .ok_or(RejectionReason::MissingKey)?;
        match STANDARD.decode(key) {
            Ok(decoded) if decoded.len() == 16 => Ok(key.to_string()),
            _ => Err(RejectionReason::InvalidKey),
        }
    }

    /// Complete the handshake and start a session.
    ///
    /// `leftover` holds any bytes the dispatcher read past the request head;
    /// they are the first bytes of the framed stream.
    pub async fn try_upgrade<S>(
        &self,
        request: &HttpRequest,
        mut stream: S,
        leftover: Vec<u8>,
        peer_addr: Option<SocketAddr>,
    ) -> Result<(Arc<Session>, SessionReader<S>), Rejected<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let key = match Self::validate(request) {
            Ok(key) => key,
            Err(reason) => {
                return Err(Rejected {
                    reason,
                    stream: Some(stream),
                })
            }
        };

        let response = accept_response(&key);
        if let Err(e) = write_handshake(&mut stream, response.as_bytes()).await {
            return Err(Rejected {
                reason: RejectionReason::Io(e.to_string()),
                stream: None,
            });
        }

        let ws_stream =
            WebSocketStream::from_partially_read(stream, leftover, Role::Server, Some(self.ws_config))
                .await;

        let id = self.ids.next_id();
        debug!("Handshake complete, assigned session {}", id);
        Ok(Session::start(id, ws_stream, peer_addr, request.path.clone()))
    }
}

fn accept_response(key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        derive_accept_key(key.as_bytes())
    )
}

async fn write_handshake<S>(stream: &mut S, bytes: &[u8]) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await
}
