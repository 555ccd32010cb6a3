//! End-to-end tests for twinport-http
//!
//! These tests bind a real listener on an ephemeral port and talk to it with
//! raw TCP and a tokio-tungstenite client.

use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use twinport_http::*;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Echo-and-relay application used by every test
#[derive(Default)]
struct Relay {
    sessions: Mutex<Vec<Arc<Session>>>,
    /// (closed id, ids still registered when `on_close` ran)
    closes: Mutex<Vec<(SessionId, Vec<SessionId>)>>,
}

#[async_trait]
impl Application for Relay {
    async fn get(&self, request: &HttpRequest) -> Reply {
        match request.path.as_str() {
            "/ws" => Reply::UpgradeToWebSocket,
            "/" => HttpResponse::ok().html("<h1>relay</h1>").into(),
            _ => HttpResponse::not_found().content_type(CONTENT_TYPE_HTML).into(),
        }
    }

    async fn post(&self, request: &HttpRequest) -> HttpResponse {
        HttpResponse::ok().text(format!("got {}", request.body_text()))
    }

    async fn on_open(&self, session: &Arc<Session>, _registry: &SessionRegistry) {
        self.sessions.lock().unwrap().push(session.clone());
        let _ = session.send_text(format!("welcome {}", session.id())).await;
    }

    async fn on_message(
        &self,
        session: &Arc<Session>,
        message: WebSocketMessage,
        registry: &SessionRegistry,
    ) {
        let text = message.to_text_lossy();
        let _ = session.send_text(format!("echo: {}", text)).await;
        registry
            .broadcast_text(format!("from {}: {}", session.id(), text), Some(session.id()))
            .await;
    }

    async fn on_close(&self, session: &Arc<Session>, registry: &SessionRegistry) {
        let remaining = registry.ids().await;
        self.closes.lock().unwrap().push((session.id(), remaining));
        registry
            .broadcast_text(format!("left {}", session.id()), None)
            .await;
    }
}

struct Harness {
    addr: std::net::SocketAddr,
    app: Arc<Relay>,
    registry: Arc<SessionRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<ServerResult<()>>,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(ServerConfig::bind("127.0.0.1", 0)).await
    }

    async fn start_with(config: ServerConfig) -> Self {
        let app = Arc::new(Relay::default());
        let server = Server::with_shared(config, app.clone()).unwrap();
        let bound = server.bind().await.unwrap();
        let addr = bound.local_addr();
        let registry = bound.registry();

        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(bound.serve_with_shutdown(async {
            let _ = rx.await;
        }));

        Self {
            addr,
            app,
            registry,
            shutdown: Some(tx),
            handle,
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    async fn connect(&self) -> Client {
        self.connect_with_id().await.0
    }

    /// Connect and read the id the server announced in its greeting
    async fn connect_with_id(&self) -> (Client, SessionId) {
        let (mut client, response) = connect_async(self.ws_url()).await.unwrap();
        assert_eq!(response.status().as_u16(), 101);
        let greeting = next_text(&mut client).await;
        let id = greeting
            .strip_prefix("welcome ")
            .and_then(|id| id.parse().ok())
            .map(SessionId)
            .expect("greeting carries the session id");
        (client, id)
    }

    fn close_count(&self) -> usize {
        self.app.closes.lock().unwrap().len()
    }

    async fn raw(&self, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut response = Vec::new();
        tokio::time::timeout(TIMEOUT, stream.read_to_end(&mut response))
            .await
            .expect("server did not close the connection")
            .unwrap();
        String::from_utf8_lossy(&response).into_owned()
    }

    async fn wait_for_sessions(&self, count: usize) {
        let registry = self.registry.clone();
        tokio::time::timeout(TIMEOUT, async move {
            while registry.len().await != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry never reached the expected size");
    }
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let frame = tokio::time::timeout(TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("protocol error");
        if let Message::Text(text) = frame {
            return text;
        }
    }
}

#[tokio::test]
async fn test_plain_get_and_not_found() {
    let harness = Harness::start().await;

    let response = harness.raw(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("<h1>relay</h1>"));

    let response = harness
        .raw(b"GET /does-not-exist HTTP/1.1\r\nHost: x\r\n\r\n")
        .await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.contains("Content-Type: text/html\r\n"));
    assert!(response.ends_with("Content-Length: 0\r\nConnection: close\r\n\r\n"));
}

#[tokio::test]
async fn test_post_body_is_delivered() {
    let harness = Harness::start().await;
    let response = harness
        .raw(b"POST /submit HTTP/1.1\r\nContent-Length: 4\r\n\r\nping")
        .await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("got ping"));
}

#[tokio::test]
async fn test_upgrade_with_bad_key_is_400() {
    let harness = Harness::start().await;

    for key_header in ["Sec-WebSocket-Key: tooshort\r\n", ""] {
        let request = format!(
            "GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
             Sec-WebSocket-Version: 13\r\n{}\r\n",
            key_header
        );
        let response = harness.raw(request.as_bytes()).await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.ends_with("Content-Length: 0\r\nConnection: close\r\n\r\n"));
    }
    assert!(harness.registry.is_empty().await);
}

#[tokio::test]
async fn test_valid_upgrade_switches_protocols() {
    let harness = Harness::start().await;

    let mut stream = TcpStream::connect(harness.addr).await.unwrap();
    stream
        .write_all(
            b"GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\
              Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
        )
        .await
        .unwrap();

    let mut buf = vec![0u8; 512];
    let n = tokio::time::timeout(TIMEOUT, stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let head = String::from_utf8_lossy(&buf[..n]).into_owned();
    assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    assert!(!head.contains("200 OK"));
}

#[tokio::test]
async fn test_broadcast_excludes_sender() {
    let harness = Harness::start().await;
    let mut a = harness.connect().await;
    let mut b = harness.connect().await;
    let mut c = harness.connect().await;
    harness.wait_for_sessions(3).await;

    a.send(Message::Text("hello".to_string())).await.unwrap();

    assert_eq!(next_text(&mut a).await, "echo: hello");
    let relayed_b = next_text(&mut b).await;
    let relayed_c = next_text(&mut c).await;
    assert_eq!(relayed_b, relayed_c);
    assert!(relayed_b.starts_with("from ") && relayed_b.ends_with(": hello"));
}

#[tokio::test]
async fn test_close_removes_session_before_callback() {
    let harness = Harness::start().await;
    let mut a = harness.connect().await;
    let mut b = harness.connect().await;
    harness.wait_for_sessions(2).await;

    a.close(None).await.unwrap();
    let notice = next_text(&mut b).await;
    assert!(notice.starts_with("left "));
    harness.wait_for_sessions(1).await;

    let closes = harness.app.closes.lock().unwrap().clone();
    assert_eq!(closes.len(), 1);
    let (closed, remaining) = &closes[0];
    assert!(!remaining.contains(closed));
    assert_eq!(remaining.len(), 1);

    b.close(None).await.unwrap();
}

#[tokio::test]
async fn test_send_after_close_fails() {
    let harness = Harness::start().await;
    let mut client = harness.connect().await;
    harness.wait_for_sessions(1).await;

    client.close(None).await.unwrap();
    harness.wait_for_sessions(0).await;

    let session = harness.app.sessions.lock().unwrap()[0].clone();
    let result = tokio::time::timeout(TIMEOUT, session.send_text("too late"))
        .await
        .expect("send after close must not hang");
    assert!(matches!(result, Err(WebSocketError::SessionClosed(id)) if id == session.id()));
}

#[tokio::test]
async fn test_concurrent_opens_and_closes_keep_registry_consistent() {
    let harness = Harness::start().await;

    let mut closing = join_all((0..16).map(|_| harness.connect_with_id())).await;
    harness.wait_for_sessions(16).await;

    let unique: HashSet<SessionId> = closing.iter().map(|(_, id)| *id).collect();
    assert_eq!(unique.len(), 16);
    let mut registered = harness.registry.ids().await;
    registered.sort();
    registered.dedup();
    assert_eq!(registered.len(), 16);

    let staying = closing.split_off(8);
    let closed_ids: HashSet<SessionId> = closing.iter().map(|(_, id)| *id).collect();

    let results = join_all(closing.iter_mut().map(|(client, _)| client.close(None))).await;
    assert!(results.iter().all(|r| r.is_ok()));

    harness.wait_for_sessions(8).await;
    tokio::time::timeout(TIMEOUT, async {
        while harness.close_count() < 8 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("every closed session reaches on_close");

    let closes = harness.app.closes.lock().unwrap().clone();
    assert_eq!(closes.len(), 8);
    for (closed, remaining) in &closes {
        assert!(closed_ids.contains(closed));
        assert!(!remaining.contains(closed));
    }

    let mut registered = harness.registry.ids().await;
    registered.sort();
    let mut expected: Vec<SessionId> = staying.iter().map(|(_, id)| *id).collect();
    expected.sort();
    assert_eq!(registered, expected);
    assert_eq!(harness.registry.len().await, 8);
}

/// The server runs the way the binary runs it: on its own runtime, dropped
/// as soon as `serve_with_shutdown` returns.
#[test]
fn test_shutdown_finishes_sessions_before_runtime_drops() {
    let app = Arc::new(Relay::default());
    let (addr_tx, addr_rx) = std::sync::mpsc::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let server_app = app.clone();
    let server = std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let served = runtime.block_on(async move {
            let bound = Server::with_shared(ServerConfig::bind("127.0.0.1", 0), server_app)
                .unwrap()
                .bind()
                .await
                .unwrap();
            addr_tx.send(bound.local_addr()).unwrap();
            bound
                .serve_with_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });
        drop(runtime);
        served
    });

    let addr = addr_rx.recv_timeout(TIMEOUT).unwrap();
    let client_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let frames = client_runtime.block_on(async move {
        let (mut client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        assert!(next_text(&mut client).await.starts_with("welcome "));

        stop_tx.send(()).unwrap();

        // keep reading so the client answers the server's Close
        let mut frames = Vec::new();
        loop {
            match tokio::time::timeout(TIMEOUT, client.next())
                .await
                .expect("server never ended the session")
            {
                Some(Ok(frame)) => frames.push(frame),
                Some(Err(e)) => panic!("session ended without a close handshake: {}", e),
                None => break,
            }
        }
        frames
    });

    let served = server.join().unwrap();
    assert!(served.is_ok());
    assert!(
        frames.iter().any(|frame| matches!(frame, Message::Close(_))),
        "client saw {:?}",
        frames
    );

    let closes = app.closes.lock().unwrap();
    assert_eq!(closes.len(), 1);
    assert!(closes[0].1.is_empty());
}

#[tokio::test]
async fn test_shutdown_gives_up_on_stalled_connections() {
    let config = ServerConfig {
        shutdown_timeout_secs: 1,
        ..ServerConfig::bind("127.0.0.1", 0)
    };
    let mut harness = Harness::start_with(config).await;

    // accepted, but never sends a request
    let _idle = TcpStream::connect(harness.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    if let Some(shutdown) = harness.shutdown.take() {
        shutdown.send(()).unwrap();
    }
    let served = tokio::time::timeout(TIMEOUT, &mut harness.handle)
        .await
        .expect("shutdown must not wait past its timeout")
        .unwrap();
    assert!(served.is_ok());
    assert!(started.elapsed() >= Duration::from_millis(900));
}
