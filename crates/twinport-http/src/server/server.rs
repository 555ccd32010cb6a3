//! # Twinport Server
//!
//! Binds one TCP listener and serves plain HTTP and WebSocket sessions on it.
//! Each accepted connection runs on its own task.

use super::application::Application;
use super::dispatcher::Dispatcher;
use super::lifecycle::shutdown_signal;
use crate::config::ServerConfig;
use crate::errors::{ServerError, ServerResult};
use crate::websocket::SessionRegistry;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Pause after an accept error that is not tied to a single connection
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// The server, before its listener is bound
///
/// # Example
///
/// ```rust,no_run
/// use twinport_http::{Application, HttpRequest, HttpResponse, Reply, Server, ServerConfig};
///
/// struct Hello;
///
/// #[async_trait::async_trait]
/// impl Application for Hello {
///     async fn get(&self, _request: &HttpRequest) -> Reply {
///         HttpResponse::ok().text("hello").into()
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = Server::new(ServerConfig::bind("127.0.0.1", 8009), Hello)?;
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    config: ServerConfig,
    app: Arc<dyn Application>,
    registry: Arc<SessionRegistry>,
}

impl Server {
    /// Create a server; the configuration is validated here
    pub fn new<A: Application>(config: ServerConfig, app: A) -> ServerResult<Self> {
        Self::with_shared(config, Arc::new(app))
    }

    /// Create a server around an application that is already shared
    pub fn with_shared(config: ServerConfig, app: Arc<dyn Application>) -> ServerResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            app,
            registry: Arc::new(SessionRegistry::new()),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registry of this server's sessions
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Bind the listener. Failing to bind is the only fatal startup error.
    pub async fn bind(self) -> ServerResult<BoundServer> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::bind(addr, e.to_string()))?;
        let local_addr = listener.local_addr()?;

        info!("✅ Server listening on {}", local_addr);

        Ok(BoundServer {
            listener,
            local_addr,
            shutdown_timeout: self.config.shutdown_timeout(),
            dispatcher: Dispatcher::new(self.app, self.registry, self.config),
        })
    }

    /// Bind and serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> ServerResult<()> {
        self.bind().await?.serve_with_shutdown(shutdown_signal()).await
    }
}

/// A server whose listener is bound and ready to accept
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown_timeout: Duration,
    dispatcher: Dispatcher,
}

impl BoundServer {
    /// Address actually bound; differs from the configured one for port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.dispatcher.registry().clone()
    }

    /// Accept connections forever
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Accept connections until `signal` resolves, then close every session.
    ///
    /// Returns once every connection task has run its close path, or once
    /// the configured shutdown timeout has passed and the rest were aborted.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(signal);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut signal => break,
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        error!("Connection task failed: {}", e);
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let dispatcher = self.dispatcher.clone();
                        let span = info_span!("connection", peer = %peer);
                        connections.spawn(
                            async move { dispatcher.handle_connection(stream, Some(peer)).await }
                                .instrument(span),
                        );
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        if let Some(backoff) = accept_backoff(&e) {
                            tokio::time::sleep(backoff).await;
                        }
                    }
                },
            }
        }

        info!("Stopped accepting connections on {}", self.local_addr);
        drop(self.listener);

        let closing = self.dispatcher.registry().close_all().await;
        debug!(
            "Asked {} sessions to close ({} already gone)",
            closing.closed,
            closing.failed.len()
        );

        let drain = async {
            while let Some(finished) = connections.join_next().await {
                if let Err(e) = finished {
                    error!("Connection task failed: {}", e);
                }
            }
        };
        if tokio::time::timeout(self.shutdown_timeout, drain).await.is_err() {
            warn!(
                "{} connections still open after {:?}, aborting them",
                connections.len(),
                self.shutdown_timeout
            );
            connections.shutdown().await;
        }

        Ok(())
    }
}

/// Pause before the next accept, if any. Errors about a single connection
/// are retried at once; listener-level ones such as EMFILE wait.
fn accept_backoff(error: &io::Error) -> Option<Duration> {
    match error.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset => None,
        _ => Some(ACCEPT_ERROR_BACKOFF),
    }
}
