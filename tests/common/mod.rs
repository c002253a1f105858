//! In-process feed server for integration tests
//!
//! Accepts WebSocket upgrades on `/ws` and hands each accepted connection to
//! the test as a [`Session`], which can read client frames and push server
//! frames.

#![allow(dead_code)]

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uof_client::{ConnectionState, UofClient};

pub const WAIT: Duration = Duration::from_secs(2);

pub struct FeedServer {
    addr: SocketAddr,
    sessions: mpsc::UnboundedReceiver<Session>,
}

impl FeedServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, sessions) = mpsc::unbounded_channel();

        let app = Router::new().route("/ws", get(ws_handler)).with_state(tx);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, sessions }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Wait for the next accepted connection
    pub async fn next_session(&mut self) -> Session {
        timeout(WAIT, self.sessions.recv())
            .await
            .expect("no connection within timeout")
            .expect("server stopped")
    }

    /// Whether a connection arrives within `window`
    pub async fn session_within(&mut self, window: Duration) -> Option<Session> {
        timeout(window, self.sessions.recv()).await.ok().flatten()
    }
}

/// One accepted client connection
pub struct Session {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    pub accepted_at: Instant,
}

impl Session {
    /// Next text frame from the client, parsed as JSON
    pub async fn recv_frame(&mut self) -> Option<Value> {
        let text = timeout(WAIT, self.inbound.recv()).await.ok().flatten()?;
        Some(serde_json::from_str(&text).expect("client sent invalid JSON"))
    }

    /// Whether the client sends anything within `window`
    pub async fn frame_within(&mut self, window: Duration) -> Option<String> {
        timeout(window, self.inbound.recv()).await.ok().flatten()
    }

    pub fn push(&self, text: impl Into<String>) {
        self.send(Message::Text(text.into().into()));
    }

    pub fn push_json(&self, value: &Value) {
        self.push(value.to_string());
    }

    pub fn push_binary(&self, data: Vec<u8>) {
        self.send(Message::Binary(data.into()));
    }

    /// Close the connection from the server side
    pub fn close(&mut self) {
        self.outbound = None;
    }

    fn send(&self, msg: Message) {
        self.outbound
            .as_ref()
            .expect("session already closed")
            .send(msg)
            .expect("session task gone");
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(sessions): State<mpsc::UnboundedSender<Session>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_session(socket, sessions))
}

async fn run_session(mut socket: WebSocket, sessions: mpsc::UnboundedSender<Session>) {
    let (in_tx, inbound) = mpsc::unbounded_channel();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();

    let session = Session {
        inbound,
        outbound: Some(out_tx),
        accepted_at: Instant::now(),
    };
    if sessions.send(session).is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = in_tx.send(text.as_str().to_string());
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            out = out_rx.recv() => match out {
                Some(msg) => {
                    if socket.send(msg).await.is_err() {
                        break;
                    }
                }
                None => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
        }
    }
}

/// Records the names of events as listeners receive them
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every emit of `name` as `name`
    pub fn track(&self, client: &UofClient, name: &str) {
        let entries = self.entries.clone();
        let tag = name.to_string();
        client.listen(name, move |_| entries.lock().push(tag.clone()));
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == name).count()
    }

    pub async fn wait_for_count(&self, name: &str, n: usize) {
        wait_until(|| self.count(name) >= n).await;
    }
}

/// Poll `cond` until it holds, failing the test after [`WAIT`]
pub async fn wait_until<F>(cond: F)
where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within timeout");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_state(client: &UofClient, state: ConnectionState) {
    let mut rx = client.state_receiver();
    timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("state {:?} not reached", state))
        .expect("client dropped");
}
