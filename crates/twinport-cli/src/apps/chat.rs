//! Chat room demo
//!
//! `GET /` either upgrades to a WebSocket session or serves a page that opens
//! one. Every message is echoed to its sender and relayed to everyone else.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use twinport_http::{
    Application, HttpRequest, HttpResponse, Reply, Session, SessionRegistry, WebSocketMessage,
};

const CHAT_PAGE: &str = include_str!("../../assets/chat.html");

#[derive(Debug, Default)]
pub struct Chat;

impl Chat {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Application for Chat {
    async fn get(&self, request: &HttpRequest) -> Reply {
        if request.path != "/" {
            return HttpResponse::not_found().into();
        }
        if request.headers.has_token("upgrade", "websocket") {
            return Reply::UpgradeToWebSocket;
        }
        HttpResponse::ok().html(CHAT_PAGE).into()
    }

    async fn post(&self, request: &HttpRequest) -> HttpResponse {
        if request.path == "/" {
            info!(body = %request.body_text(), "POST received");
            HttpResponse::ok()
        } else {
            HttpResponse::not_found()
        }
    }

    async fn on_open(&self, session: &Arc<Session>, registry: &SessionRegistry) {
        let id = session.id();
        if let Err(e) = session
            .send_text(format!("hi! you are websocket number {}", id))
            .await
        {
            debug!("Greeting to session {} failed: {}", id, e);
        }
        registry
            .broadcast_text(format!("websocket {} joined", id), Some(id))
            .await;
    }

    async fn on_message(
        &self,
        session: &Arc<Session>,
        message: WebSocketMessage,
        registry: &SessionRegistry,
    ) {
        let id = session.id();
        let data = message.to_text_lossy();
        if let Err(e) = session.send_text(format!("you said: {}", data)).await {
            debug!("Echo to session {} failed: {}", id, e);
        }
        registry
            .broadcast_text(format!("websocket {} said: {}", id, data), Some(id))
            .await;
    }

    async fn on_close(&self, session: &Arc<Session>, registry: &SessionRegistry) {
        registry
            .broadcast_text(format!("websocket {} left", session.id()), None)
            .await;
    }
}
