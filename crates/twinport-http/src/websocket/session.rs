//! One upgraded duplex connection
//!
//! The protocol stream is split in two. The write half is owned by a writer
//! task fed through an unbounded channel, so any task may send without
//! blocking. The read half stays with the connection task as a
//! [`SessionReader`] and drives the message loop.

use super::types::{SessionId, SessionState, WebSocketError, WebSocketMessage, WebSocketResult};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

/// How long a finished session waits for its writer to flush the Close frame
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

enum Outbound {
    Message(Message),
    Close,
}

/// A live WebSocket session
pub struct Session {
    id: SessionId,
    peer_addr: Option<SocketAddr>,
    path: String,
    state: RwLock<SessionState>,
    sender: mpsc::UnboundedSender<Outbound>,
}

impl Session {
    /// Wrap an upgraded stream, spawning its writer task
    pub fn start<S>(
        id: SessionId,
        stream: WebSocketStream<S>,
        peer_addr: Option<SocketAddr>,
        path: String,
    ) -> (Arc<Session>, SessionReader<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = stream.split();
        let (sender, receiver) = mpsc::unbounded_channel();

        let session = Arc::new(Session {
            id,
            peer_addr,
            path,
            state: RwLock::new(SessionState::Open),
            sender,
        });

        let writer = tokio::spawn(run_writer(id, sink, receiver));

        info!("WebSocket session opened: {}", id);
        (session, SessionReader { id, stream, writer })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Request path the session was opened on
    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub async fn is_open(&self) -> bool {
        self.state().await.is_open()
    }

    /// Queue a message for delivery.
    ///
    /// Fails with [`WebSocketError::SessionClosed`] once the session has
    /// started closing or its transport has gone away. Never waits on the
    /// network.
    pub async fn send(&self, message: WebSocketMessage) -> WebSocketResult<()> {
        let state = self.state.read().await;
        if !state.is_open() {
            return Err(WebSocketError::SessionClosed(self.id));
        }

        self.sender
            .send(Outbound::Message(message.into()))
            .map_err(|_| WebSocketError::SessionClosed(self.id))
    }

    pub async fn send_text<T: Into<String>>(&self, text: T) -> WebSocketResult<()> {
        self.send(WebSocketMessage::text(text)).await
    }

    pub async fn send_binary<T: Into<Vec<u8>>>(&self, data: T) -> WebSocketResult<()> {
        self.send(WebSocketMessage::binary(data)).await
    }

    /// Start a server-initiated close.
    ///
    /// The connection task notices the peer's reply (or the dropped
    /// transport) and runs the normal close path.
    pub async fn close(&self) -> WebSocketResult<()> {
        let mut state = self.state.write().await;
        if !state.is_open() {
            return Err(WebSocketError::SessionClosed(self.id));
        }
        *state = SessionState::Closing;

        self.sender
            .send(Outbound::Close)
            .map_err(|_| WebSocketError::SessionClosed(self.id))
    }

    /// Stop accepting sends; the transport may still be draining
    pub(crate) async fn mark_closing(&self) {
        let mut state = self.state.write().await;
        if state.is_open() {
            *state = SessionState::Closing;
        }
    }

    /// Release the transport. Called once the session has left the registry.
    pub(crate) async fn finish(&self) {
        *self.state.write().await = SessionState::Closed;
        // the writer may already be gone
        let _ = self.sender.send(Outbound::Close);
        debug!("WebSocket session finished: {}", self.id);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("path", &self.path)
            .finish()
    }
}

/// Read half of a session, owned by its connection task
pub struct SessionReader<S> {
    id: SessionId,
    stream: SplitStream<WebSocketStream<S>>,
    writer: JoinHandle<()>,
}

impl<S> std::fmt::Debug for SessionReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionReader").field("id", &self.id).finish()
    }
}

impl<S> SessionReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Wait for the next data message.
    ///
    /// Returns `None` when the session is over: peer close, protocol error,
    /// I/O error and end of stream are all treated alike.
    pub async fn next_message(&mut self) -> Option<WebSocketMessage> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Close(frame))) => {
                    debug!("Received close frame for session {}: {:?}", self.id, frame);
                    return None;
                }
                Some(Ok(frame)) => {
                    if let Some(message) = WebSocketMessage::from_frame(frame) {
                        return Some(message);
                    }
                }
                Some(Err(e)) => {
                    let e = WebSocketError::from(e);
                    debug!("WebSocket read ended for session {}: {}", self.id, e);
                    return None;
                }
                None => {
                    debug!("WebSocket stream ended for session {}", self.id);
                    return None;
                }
            }
        }
    }

    /// Wait for the writer task to flush and exit.
    ///
    /// Call after [`Session::finish`]; gives up after a bounded wait and
    /// aborts the writer.
    pub(crate) async fn join_writer(self) {
        let mut writer = self.writer;
        match tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut writer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Writer task for session {} failed: {}", self.id, e),
            Err(_) => {
                warn!("Writer for session {} did not flush in time", self.id);
                writer.abort();
            }
        }
    }
}

async fn run_writer<S>(
    id: SessionId,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut receiver: mpsc::UnboundedReceiver<Outbound>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(outbound) = receiver.recv().await {
        match outbound {
            Outbound::Message(message) => {
                if let Err(e) = sink.send(message).await {
                    warn!("Failed to send message for session {}: {}", id, e);
                    break;
                }
            }
            Outbound::Close => {
                // fails harmlessly when the peer already closed
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }

    let _ = sink.close().await;
    debug!("Writer stopped for session {}", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn session_pair() -> (
        Arc<Session>,
        SessionReader<DuplexStream>,
        WebSocketStream<DuplexStream>,
    ) {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let (session, reader) = Session::start(SessionId(7), server, None, "/".to_string());
        (session, reader, client)
    }

    #[tokio::test]
    async fn test_send_reaches_peer_in_order() {
        let (session, _reader, mut client) = session_pair().await;

        session.send_text("one").await.unwrap();
        session.send_binary(vec![2u8]).await.unwrap();

        assert_eq!(
            client.next().await.unwrap().unwrap(),
            Message::Text("one".to_string())
        );
        assert_eq!(client.next().await.unwrap().unwrap(), Message::Binary(vec![2]));
    }

    #[tokio::test]
    async fn test_reader_yields_data_then_none_on_close() {
        let (session, mut reader, mut client) = session_pair().await;
        assert_eq!(reader.id(), session.id());

        client.send(Message::Text("hello".to_string())).await.unwrap();
        client.send(Message::Ping(vec![1])).await.unwrap();
        client.send(Message::Binary(vec![9])).await.unwrap();
        client.send(Message::Close(None)).await.unwrap();

        assert_eq!(reader.next_message().await, Some(WebSocketMessage::text("hello")));
        assert_eq!(reader.next_message().await, Some(WebSocketMessage::binary(vec![9])));
        assert_eq!(reader.next_message().await, None);
    }

    #[tokio::test]
    async fn test_send_after_finish_fails_distinctly() {
        let (session, _reader, _client) = session_pair().await;

        session.mark_closing().await;
        assert_eq!(session.state().await, SessionState::Closing);
        let err = session.send_text("late").await.unwrap_err();
        assert!(matches!(err, WebSocketError::SessionClosed(SessionId(7))));

        session.finish().await;
        assert!(session.state().await.is_closed());
        assert!(session.send_text("later").await.unwrap_err().is_session_closed());
    }

    #[tokio::test]
    async fn test_close_sends_close_frame() {
        let (session, _reader, mut client) = session_pair().await;

        session.close().await.unwrap();
        assert!(!session.is_open().await);
        assert!(matches!(client.next().await, Some(Ok(Message::Close(_)))));

        // second close is refused
        assert!(session.close().await.is_err());
    }

    #[tokio::test]
    async fn test_join_writer_returns_after_close_frame_is_written() {
        let (session, reader, mut client) = session_pair().await;

        session.send_text("last").await.unwrap();
        session.finish().await;
        reader.join_writer().await;

        assert_eq!(
            client.next().await.unwrap().unwrap(),
            Message::Text("last".to_string())
        );
        assert!(matches!(client.next().await, Some(Ok(Message::Close(_)))));
    }

    #[tokio::test]
    async fn test_reader_ends_when_peer_vanishes() {
        let (_session, mut reader, client) = session_pair().await;
        drop(client);
        assert_eq!(reader.next_message().await, None);
    }
}
