//! UOF feed client implementation

use crate::api::{ApiClient, EventMessages, FeedStats, Health, MessagePage, TrackedEvents};
use crate::config::UofConfig;
use crate::error::{Result, UofError};
use crate::events::{self, Event, EventDispatcher, Listener};
use crate::messages::ControlFrame;
use crate::router::MessageRouter;
use crate::subscription::SubscriptionState;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for the close handshake to flush
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection state of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to be
    Idle,
    /// WebSocket handshake in progress
    Connecting,
    /// Connected and ready
    Open,
    /// Transport closed, no reconnect scheduled
    Closed,
    /// Transport closed, reconnect timer running
    ReconnectPending,
}

/// Internal client state
struct ClientInner {
    config: UofConfig,
    state: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,

    // Transport handle, reconnect timer and the runtime reconnect flag
    conn: Mutex<ConnectionSlot>,

    subscription: Mutex<SubscriptionState>,
    dispatcher: Arc<EventDispatcher>,
    router: MessageRouter,
    api: ApiClient,
}

struct ConnectionSlot {
    transport: Option<Transport>,
    reconnect_timer: Option<ReconnectTimer>,
    auto_reconnect: bool,
    next_id: u64,
}

impl ConnectionSlot {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Handle to a live connection task
struct Transport {
    id: u64,
    tx: mpsc::UnboundedSender<Outbound>,
    open: bool,
}

struct ReconnectTimer {
    id: u64,
    handle: JoinHandle<()>,
}

/// Message to send to the connection task
enum Outbound {
    Frame(String),
    Close,
}

/// UOF feed WebSocket client
///
/// Keeps one connection to the feed, replays the current subscription on
/// every (re)connect and dispatches inbound messages to listeners registered
/// with [`UofClient::on`]. Cheaply cloneable as it uses an internal Arc.
#[derive(Clone)]
pub struct UofClient {
    inner: Arc<ClientInner>,
}

impl UofClient {
    /// Create a new client with the given configuration
    pub fn new(config: UofConfig) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let dispatcher = Arc::new(EventDispatcher::new());
        let api = ApiClient::new(config.api_url.clone());

        let inner = Arc::new(ClientInner {
            conn: Mutex::new(ConnectionSlot {
                transport: None,
                reconnect_timer: None,
                auto_reconnect: config.auto_reconnect,
                next_id: 0,
            }),
            config,
            state: state_tx,
            state_rx,
            subscription: Mutex::new(SubscriptionState::new()),
            router: MessageRouter::new(dispatcher.clone()),
            dispatcher,
            api,
        });

        Self { inner }
    }

    pub fn config(&self) -> &UofConfig {
        &self.inner.config
    }

    /// Get the current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state_rx.borrow()
    }

    /// Get a receiver for connection state changes
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Whether the transport is open and frames can be sent
    pub fn is_connected(&self) -> bool {
        self.inner.is_open()
    }

    /// Snapshot of the current subscription filters
    pub fn subscription(&self) -> SubscriptionState {
        self.inner.subscription.lock().clone()
    }

    /// Open the feed connection
    ///
    /// Returns immediately; observe the `connected`, `error` and
    /// `disconnected` events for the outcome. Calling this while a transport
    /// already exists only logs a warning. Must be called from within a Tokio
    /// runtime.
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Close the connection and stop reconnecting
    ///
    /// Cancels a pending reconnect and turns auto-reconnect off for the
    /// lifetime of the client; a later [`connect`](Self::connect) opens one
    /// connection that is not retried. Safe to call repeatedly.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Replace the subscription filters
    ///
    /// The new filters are sent right away when connected and replayed on
    /// every later connect.
    pub fn subscribe<I, S, J, T>(&self, message_types: I, event_ids: J)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let message_types: Vec<String> = message_types.into_iter().map(Into::into).collect();
        let event_ids: Vec<String> = event_ids.into_iter().map(Into::into).collect();
        debug!(?message_types, ?event_ids, "Updating subscription");

        let frame = self.inner.subscription.lock().replace(message_types, event_ids);
        if self.is_connected() {
            self.inner.send_control(&frame);
        }
    }

    /// Clear the subscription filters
    pub fn unsubscribe(&self) {
        debug!("Clearing subscription");

        let frame = self.inner.subscription.lock().clear();
        if self.is_connected() {
            self.inner.send_control(&frame);
        }
    }

    /// Send an arbitrary JSON payload
    ///
    /// Dropped with a warning when not connected; nothing is queued.
    pub fn send<T>(&self, payload: &T)
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_string(payload) {
            Ok(text) => {
                self.inner.send_text(text);
            }
            Err(e) => warn!(error = %e, "Failed to serialize outbound payload"),
        }
    }

    /// Register a listener for an event name
    ///
    /// Names are `connected`, `disconnected`, `error`, `message`, or any
    /// inbound `type` / `message_type` value.
    pub fn on(&self, name: impl Into<String>, listener: Listener) {
        self.inner.dispatcher.on(name, listener);
    }

    /// Register a closure and return the [`Listener`] needed to remove it
    pub fn listen<F>(&self, name: impl Into<String>, f: F) -> Listener
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let listener = events::listener(f);
        self.on(name, listener.clone());
        listener
    }

    /// Remove one listener, or all listeners for `name` when `None`
    pub fn off(&self, name: &str, listener: Option<&Listener>) {
        self.inner.dispatcher.off(name, listener);
    }

    /// The HTTP query client
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    /// List stored messages (`limit`, `offset`, `event_id`, `message_type`, ...)
    pub async fn get_messages<Q>(&self, params: &Q) -> Result<MessagePage>
    where
        Q: Serialize + ?Sized,
    {
        self.inner.api.get_messages(params).await
    }

    /// List the events the backend is tracking
    pub async fn get_tracked_events(&self) -> Result<TrackedEvents> {
        self.inner.api.get_tracked_events().await
    }

    /// List stored messages for one event
    pub async fn get_event_messages(&self, event_id: &str) -> Result<EventMessages> {
        self.inner.api.get_event_messages(event_id).await
    }

    /// Fetch aggregate counters
    pub async fn get_stats(&self) -> Result<FeedStats> {
        self.inner.api.get_stats().await
    }

    /// Probe backend liveness
    pub async fn health(&self) -> Result<Health> {
        self.inner.api.health().await
    }
}

impl ClientInner {
    fn set_state(&self, state: ConnectionState) {
        let _ = self.state.send(state);
    }

    fn is_open(&self) -> bool {
        self.conn
            .lock()
            .transport
            .as_ref()
            .is_some_and(|t| t.open)
    }

    fn emit(&self, name: &str, event: &Event) {
        self.dispatcher.emit(name, event);
    }

    fn emit_error(&self, err: UofError) {
        self.emit(events::ERROR, &Event::error(err));
    }

    fn connect(self: &Arc<Self>) {
        let mut slot = self.conn.lock();
        if slot.transport.is_some() {
            warn!("Already connected");
            return;
        }

        if let Some(timer) = slot.reconnect_timer.take() {
            timer.handle.abort();
        }

        self.open_transport(slot);
    }

    fn disconnect(&self) {
        let mut slot = self.conn.lock();
        slot.auto_reconnect = false;

        if let Some(timer) = slot.reconnect_timer.take() {
            timer.handle.abort();
            debug!("Cancelled pending reconnect");
        }

        if let Some(transport) = slot.transport.take() {
            info!(transport = transport.id, "Disconnecting");
            let _ = transport.tx.send(Outbound::Close);
        }

        self.set_state(ConnectionState::Idle);
    }

    /// Start a connection task; the caller has checked there is no transport
    fn open_transport(self: &Arc<Self>, mut slot: MutexGuard<'_, ConnectionSlot>) {
        let started = Handle::try_current()
            .map_err(|_| UofError::NoRuntime)
            .and_then(|runtime| Ok((runtime, build_request(&self.config.ws_url)?)));

        let (runtime, request) = match started {
            Ok(started) => started,
            Err(e) => {
                self.set_state(ConnectionState::Idle);
                drop(slot);
                error!(error = %e, url = %self.config.ws_url, "Failed to connect");
                self.emit_error(e);
                return;
            }
        };

        let id = slot.next_id();
        let (tx, rx) = mpsc::unbounded_channel();
        slot.transport = Some(Transport { id, tx, open: false });
        self.set_state(ConnectionState::Connecting);
        drop(slot);

        info!(url = %self.config.ws_url, transport = id, "Connecting");
        runtime.spawn(connection_task(self.clone(), id, request, rx));
    }

    fn send_control(&self, frame: &ControlFrame) {
        match serde_json::to_string(frame) {
            Ok(text) => {
                self.send_text(text);
            }
            Err(e) => warn!(error = %e, "Failed to serialize control frame"),
        }
    }

    fn send_text(&self, text: String) -> bool {
        let slot = self.conn.lock();
        match slot.transport.as_ref().filter(|t| t.open) {
            Some(transport) => transport.tx.send(Outbound::Frame(text)).is_ok(),
            None => {
                warn!("Not connected, dropping outbound frame");
                false
            }
        }
    }

    /// Transport `id` finished its handshake
    ///
    /// Returns false if the transport was superseded in the meantime.
    fn handle_open(&self, id: u64) -> bool {
        {
            let mut slot = self.conn.lock();
            match slot.transport.as_mut() {
                Some(transport) if transport.id == id => transport.open = true,
                _ => return false,
            }
            self.set_state(ConnectionState::Open);
        }

        info!(transport = id, "Connected to UOF WebSocket");
        self.emit(events::CONNECTED, &Event::Connected);

        let resubscribe = self.subscription.lock().resubscribe_frame();
        if let Some(frame) = resubscribe {
            debug!(transport = id, "Replaying subscription");
            self.send_control(&frame);
        }

        true
    }

    /// Transport `id` stopped reading; later sends take the not-connected path
    fn mark_closing(&self, id: u64) {
        let mut slot = self.conn.lock();
        if let Some(transport) = slot.transport.as_mut().filter(|t| t.id == id) {
            transport.open = false;
        }
    }

    /// Transport `id` is gone, for whatever reason
    fn handle_close(self: &Arc<Self>, id: u64) {
        let current = {
            let mut slot = self.conn.lock();
            let current = slot.transport.as_ref().is_some_and(|t| t.id == id);
            if current {
                slot.transport = None;
                self.set_state(ConnectionState::Closed);
            }
            current
        };

        info!(transport = id, "Disconnected from UOF WebSocket");
        self.emit(events::DISCONNECTED, &Event::Disconnected);

        // A superseded transport never schedules a reconnect
        if current {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let mut slot = self.conn.lock();
        // A listener may have disconnected or reconnected us already
        if !slot.auto_reconnect || slot.transport.is_some() || slot.reconnect_timer.is_some() {
            return;
        }

        let id = slot.next_id();
        let delay = self.config.reconnect_interval;
        let inner: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.fire_reconnect(id);
            }
        });

        slot.reconnect_timer = Some(ReconnectTimer { id, handle });
        self.set_state(ConnectionState::ReconnectPending);
        info!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
    }

    fn fire_reconnect(self: &Arc<Self>, timer_id: u64) {
        let mut slot = self.conn.lock();
        // Cancelled or replaced while we were waking up
        if slot.reconnect_timer.as_ref().map(|t| t.id) != Some(timer_id) {
            return;
        }
        slot.reconnect_timer = None;

        if !slot.auto_reconnect {
            return;
        }
        if slot.transport.is_some() {
            warn!("Already connected");
            return;
        }

        info!("Reconnecting...");
        self.open_transport(slot);
    }
}

fn build_request(url: &str) -> Result<Request> {
    let request = url
        .into_client_request()
        .map_err(|e| UofError::InvalidUrl(format!("{url}: {e}")))?;

    match request.uri().scheme_str() {
        Some("ws") | Some("wss") => Ok(request),
        other => Err(UofError::InvalidUrl(format!(
            "{url}: unsupported scheme {}",
            other.unwrap_or("(none)")
        ))),
    }
}

/// Owns one WebSocket from handshake to close
async fn connection_task(
    inner: Arc<ClientInner>,
    id: u64,
    request: Request,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let ws = tokio::select! {
        result = tokio_tungstenite::connect_async(request) => match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                warn!(transport = id, error = %e, "WebSocket connect failed");
                inner.emit_error(UofError::Connection(e.to_string()));
                inner.handle_close(id);
                return;
            }
        },
        // Only Close (or a dropped handle) can arrive before the socket opens
        _ = rx.recv() => {
            debug!(transport = id, "Connect cancelled");
            inner.handle_close(id);
            return;
        }
    };

    let (mut sink, mut stream) = ws.split();

    if inner.handle_open(id) {
        loop {
            tokio::select! {
                outbound = rx.recv() => match outbound {
                    Some(Outbound::Frame(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            warn!(transport = id, error = %e, "WebSocket write failed");
                            inner.emit_error(UofError::Transport(e.to_string()));
                            break;
                        }
                    }
                    Some(Outbound::Close) | None => {
                        debug!(transport = id, "Closing WebSocket");
                        break;
                    }
                },

                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        inner.router.route_text(text.as_str());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        inner.router.route_binary(&data);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(transport = id, ?frame, "Connection closed by server");
                        break;
                    }
                    // Ping/pong are answered by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(transport = id, error = %e, "WebSocket error");
                        inner.emit_error(UofError::Transport(e.to_string()));
                        break;
                    }
                    None => {
                        debug!(transport = id, "WebSocket stream ended");
                        break;
                    }
                },
            }
        }
    }

    inner.mark_closing(id);
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
        debug!(transport = id, "Timed out flushing close frame");
    }

    inner.handle_close(id);
}
