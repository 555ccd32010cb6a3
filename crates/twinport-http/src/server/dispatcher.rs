//! Per-connection request dispatch
//!
//! Every accepted connection carries exactly one request. The dispatcher
//! reads it, routes it to the application and either answers over HTTP or
//! hands the socket to the negotiator and runs the session until it ends.

use super::application::Application;
use crate::config::ServerConfig;
use crate::request::{read_body, read_request_head, HttpRequest, Method, RequestError};
use crate::response::{HttpResponse, Reply};
use crate::websocket::{Negotiator, Session, SessionReader, SessionRegistry};
use futures_util::FutureExt;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// Routes connections to an application. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    app: Arc<dyn Application>,
    registry: Arc<SessionRegistry>,
    negotiator: Arc<Negotiator>,
    config: Arc<ServerConfig>,
}

impl Dispatcher {
    pub fn new(
        app: Arc<dyn Application>,
        registry: Arc<SessionRegistry>,
        config: ServerConfig,
    ) -> Self {
        let negotiator = Negotiator::new(&config.websocket);
        Self {
            app,
            registry,
            negotiator: Arc::new(negotiator),
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Serve one connection from first byte to close
    pub async fn handle_connection<S>(&self, mut stream: S, peer_addr: Option<SocketAddr>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (head, leftover) =
            match read_request_head(&mut stream, self.config.max_header_size).await {
                Ok(parsed) => parsed,
                Err(RequestError::ConnectionClosed) => {
                    debug!("Peer closed before sending a complete request");
                    respond(&mut stream, HttpResponse::bad_request(), true).await;
                    return;
                }
                Err(e) => {
                    warn!("Rejecting unreadable request: {}", e);
                    respond(&mut stream, HttpResponse::bad_request(), true).await;
                    return;
                }
            };

        let request = HttpRequest::from_head(head);
        debug!("{} {}", request.method, request.target);

        if request.method.is_get_like() {
            self.handle_get(request, stream, leftover, peer_addr).await
        } else if request.method == Method::Post {
            self.handle_post(request, stream, leftover).await
        } else {
            debug!("Method {} not allowed", request.method);
            respond(&mut stream, HttpResponse::method_not_allowed(), true).await;
        }
    }

    async fn handle_get<S>(
        &self,
        request: HttpRequest,
        mut stream: S,
        leftover: Vec<u8>,
        peer_addr: Option<SocketAddr>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let include_body = request.method == Method::Get;

        let reply = match guarded("get", self.app.get(&request)).await {
            Some(reply) => reply,
            None => {
                respond(&mut stream, HttpResponse::with_status(500), include_body).await;
                return;
            }
        };

        match reply {
            Reply::Respond(response) => respond(&mut stream, response, include_body).await,
            Reply::UpgradeToWebSocket => {
                match self
                    .negotiator
                    .try_upgrade(&request, stream, leftover, peer_addr)
                    .await
                {
                    Ok((session, reader)) => self.run_session(session, reader).await,
                    Err(rejected) => {
                        warn!("WebSocket upgrade rejected: {}", rejected.reason);
                        if let Some(mut stream) = rejected.stream {
                            respond(&mut stream, HttpResponse::bad_request(), include_body).await;
                        }
                    }
                }
            }
        }
    }

    async fn handle_post<S>(&self, mut request: HttpRequest, mut stream: S, leftover: Vec<u8>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let length = request.content_length().unwrap_or(0);
        if length > self.config.max_body_size {
            warn!(
                "POST body of {} bytes exceeds limit of {}",
                length, self.config.max_body_size
            );
            respond(&mut stream, HttpResponse::payload_too_large(), true).await;
            return;
        }

        request.body = match read_body(&mut stream, leftover, length).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to read POST body: {}", e);
                respond(&mut stream, HttpResponse::bad_request(), true).await;
                return;
            }
        };

        let response = guarded("post", self.app.post(&request))
            .await
            .unwrap_or_else(|| HttpResponse::with_status(500));
        respond(&mut stream, response, true).await;
    }

    /// Drive an open session until its peer goes away.
    ///
    /// The session always leaves the registry before `on_close` runs, even
    /// when a callback panics.
    ///
    /// Returns once the writer has flushed the Close frame, so a tracked
    /// connection task outlives its session's transport.
    async fn run_session<S>(&self, session: Arc<Session>, mut reader: SessionReader<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = session.id();
        if !self.registry.add(session.clone()).await {
            error!("Session id {} was already registered", id);
            session.finish().await;
            reader.join_writer().await;
            return;
        }

        let registry = self.registry.as_ref();
        let opened = guarded("on_open", self.app.on_open(&session, registry))
            .await
            .is_some();

        if opened {
            while let Some(message) = reader.next_message().await {
                let delivered = guarded(
                    "on_message",
                    self.app.on_message(&session, message, registry),
                )
                .await;
                if delivered.is_none() {
                    break;
                }
            }
        }

        session.mark_closing().await;
        self.registry.remove(id).await;
        session.finish().await;
        info!("WebSocket session closed: {}", id);

        guarded("on_close", self.app.on_close(&session, registry)).await;
        reader.join_writer().await;
    }
}

/// Run an application callback, turning a panic into `None`
async fn guarded<F, T>(callback: &'static str, future: F) -> Option<T>
where
    F: Future<Output = T>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(value) => Some(value),
        Err(_) => {
            error!("Application callback `{}` panicked", callback);
            None
        }
    }
}

async fn respond<S>(stream: &mut S, response: HttpResponse, include_body: bool)
where
    S: AsyncWrite + Unpin,
{
    debug!("Responding {}", response.status);
    if let Err(e) = response.write_to(stream, include_body).await {
        debug!("Failed to write response: {}", e);
        return;
    }
    let _ = stream.shutdown().await;
}
