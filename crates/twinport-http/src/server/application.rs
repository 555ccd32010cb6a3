//! Application behavior plugged into the dispatcher

use crate::request::HttpRequest;
use crate::response::{HttpResponse, Reply};
use crate::websocket::{Session, SessionRegistry, WebSocketMessage};
use async_trait::async_trait;
use std::sync::Arc;

/// What a server does with requests and sessions.
///
/// `get` is the only place an upgrade can be requested. The lifecycle
/// callbacks receive the registry explicitly; they default to doing nothing.
#[async_trait]
pub trait Application: Send + Sync + 'static {
    /// Answer a GET (or HEAD) request, or ask for a WebSocket upgrade
    async fn get(&self, request: &HttpRequest) -> Reply;

    /// Answer a POST request; `request.path` is the full request target
    async fn post(&self, request: &HttpRequest) -> HttpResponse {
        let _ = request;
        HttpResponse::not_found()
    }

    /// Called once the session is registered
    async fn on_open(&self, session: &Arc<Session>, registry: &SessionRegistry) {
        let _ = (session, registry);
    }

    /// Called for each text or binary message, in arrival order
    async fn on_message(
        &self,
        session: &Arc<Session>,
        message: WebSocketMessage,
        registry: &SessionRegistry,
    ) {
        let _ = (session, message, registry);
    }

    /// Called after the session has left the registry
    async fn on_close(&self, session: &Arc<Session>, registry: &SessionRegistry) {
        let _ = (session, registry);
    }
}
