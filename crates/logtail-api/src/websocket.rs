//! WebSocket event stream with fixed-interval auto-reconnect.
//!
//! Connects to the session endpoint handed out by the authorization step and
//! forwards every parsed frame through a bounded [`tokio::sync::mpsc`]
//! channel, in arrival order. Dropped connections are retried after a fixed
//! delay until [`WebSocketClient::stop`] is called.
//!
//! # Example
//!
//! ```rust,ignore
//! use logtail_api::websocket::{WebSocketClient, WebSocketConfig};
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::channel(256);
//! let client = WebSocketClient::new(
//!     session.endpoint.clone(),
//!     &session.session_id,
//!     &session.authorized_feature,
//!     WebSocketConfig::default(),
//!     tx,
//! );
//! client.start();
//!
//! while let Some(msg) = rx.recv().await {
//!     println!("{}", msg.kind());
//! }
//!
//! client.stop().await;
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::Error;
use crate::message::IncomingMessage;
use crate::session::DEFAULT_RECONNECT_DELAY;
use crate::transport::USER_AGENT;

// ── Timing ───────────────────────────────────────────────────────────

const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on the close handshake when stopping.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on waiting for the loop task to exit before aborting it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

// ── StreamState ──────────────────────────────────────────────────────

/// Lifecycle of the streaming connection.
///
/// `Stopped` is terminal: once entered, no further transition is accepted,
/// so the loop can never resume reconnecting after a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StreamState {
    /// Constructed, not yet started.
    Idle,
    Connecting,
    /// Handshake completed, no frame delivered yet on this connection.
    Connected,
    /// At least one frame delivered on the current connection.
    Streaming,
    /// Connection lost, waiting out the reconnect delay.
    Reconnecting,
    Stopped,
}

impl StreamState {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Stopped, _) => false,
            (_, Self::Stopped)
            | (Self::Idle | Self::Reconnecting, Self::Connecting)
            | (Self::Connecting, Self::Connected)
            | (Self::Connected, Self::Streaming)
            | (Self::Connecting | Self::Connected | Self::Streaming, Self::Reconnecting) => true,
            _ => false,
        }
    }

    pub fn is_stopped(self) -> bool {
        self == Self::Stopped
    }
}

/// Apply a transition if the state machine allows it. Returns `true` when the
/// state changed.
fn transition(state: &watch::Sender<StreamState>, next: StreamState) -> bool {
    state.send_if_modified(|current| {
        if current.can_transition_to(next) {
            trace!(from = %current, to = %next, "stream state change");
            *current = next;
            true
        } else {
            false
        }
    })
}

/// Marks the stream `Stopped` when the loop task exits, however it exits.
struct StopOnExit(Arc<watch::Sender<StreamState>>);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        transition(&self.0, StreamState::Stopped);
    }
}

// ── WebSocketConfig ──────────────────────────────────────────────────

/// Connection behavior for [`WebSocketClient`].
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Rewrite `wss://` endpoints to plain `ws://`.
    pub allow_unencrypted: bool,

    /// Fixed delay between reconnect attempts. No backoff, no attempt cap.
    pub reconnect_interval: Duration,

    /// How often a keepalive ping is written on an open connection.
    pub ping_interval: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            allow_unencrypted: false,
            reconnect_interval: DEFAULT_RECONNECT_DELAY,
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }
}

// ── WebSocketClient ──────────────────────────────────────────────────

/// Auto-reconnecting websocket client for one authorized session.
///
/// [`start`](Self::start) spawns the connection loop and returns at once;
/// [`stop`](Self::stop) cancels it and waits for the task to exit. Both are
/// idempotent. After `stop` returns no further message is sent on the
/// events channel.
pub struct WebSocketClient {
    url: Url,
    session_id: String,
    config: WebSocketConfig,
    state: Arc<watch::Sender<StreamState>>,
    cancel: CancellationToken,
    events: Mutex<Option<mpsc::Sender<IncomingMessage>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketClient {
    /// Build a client for `endpoint`, scoped to `feature`.
    ///
    /// Parsed frames are sent on `events`. Nothing connects until
    /// [`start`](Self::start) is called.
    pub fn new(
        endpoint: Url,
        session_id: impl Into<String>,
        feature: &str,
        config: WebSocketConfig,
        events: mpsc::Sender<IncomingMessage>,
    ) -> Self {
        let url = stream_url(&endpoint, feature, config.allow_unencrypted);
        let (state, _) = watch::channel(StreamState::Idle);

        Self {
            url,
            session_id: session_id.into(),
            config,
            state: Arc::new(state),
            cancel: CancellationToken::new(),
            events: Mutex::new(Some(events)),
            task: Mutex::new(None),
        }
    }

    /// The URL the client connects to (scheme rewrite and feature applied).
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    /// The current state.
    pub fn current_state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Spawn the connection loop on the current tokio runtime.
    ///
    /// Calling this again, or after [`stop`](Self::stop), does nothing.
    pub fn start(&self) {
        let mut task = lock(&self.task);
        if task.is_some() {
            debug!("WebSocket client already started");
            return;
        }

        let Some(events) = lock(&self.events).take() else {
            debug!("WebSocket client already stopped, not starting");
            return;
        };

        let ctx = LoopContext {
            url: self.url.clone(),
            session_id: self.session_id.clone(),
            config: self.config.clone(),
            events,
            state: Arc::clone(&self.state),
            cancel: self.cancel.clone(),
        };

        *task = Some(tokio::spawn(ws_loop(ctx)));
    }

    /// Stop the connection loop and wait for it to exit.
    ///
    /// Interrupts any in-flight connect, read, delivery, or reconnect wait,
    /// and sends a close frame on a live connection.
    pub async fn stop(&self) {
        transition(&self.state, StreamState::Stopped);
        self.cancel.cancel();
        drop(lock(&self.events).take());

        let handle = lock(&self.task).take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(STOP_TIMEOUT, &mut handle).await.is_err() {
                warn!("WebSocket loop did not exit in time, aborting");
                handle.abort();
            }
            debug!("WebSocket client stopped");
        }
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Apply the scheme rewrite and feature query to the session endpoint.
fn stream_url(endpoint: &Url, feature: &str, allow_unencrypted: bool) -> Url {
    let mut url = endpoint.clone();
    if allow_unencrypted && url.scheme() == "wss" && url.set_scheme("ws").is_err() {
        warn!(url = %endpoint, "could not downgrade websocket scheme");
    }
    url.query_pairs_mut()
        .append_pair("websocket_feature", feature);
    url
}

// ── Background reconnection loop ─────────────────────────────────────

struct LoopContext {
    url: Url,
    session_id: String,
    config: WebSocketConfig,
    events: mpsc::Sender<IncomingMessage>,
    state: Arc<watch::Sender<StreamState>>,
    cancel: CancellationToken,
}

/// Why a single connection ended without an error.
enum Disconnect {
    /// Server closed the connection or the stream ended.
    Remote,
    /// The events receiver was dropped; nobody is listening any more.
    ConsumerGone,
    Cancelled,
}

/// Main loop: connect → read → on loss, wait the fixed delay → reconnect.
async fn ws_loop(ctx: LoopContext) {
    let _stopped = StopOnExit(Arc::clone(&ctx.state));

    loop {
        if !transition(&ctx.state, StreamState::Connecting) {
            break;
        }

        match connect_and_read(&ctx).await {
            Ok(Disconnect::Remote) => info!("WebSocket disconnected"),
            Ok(Disconnect::ConsumerGone) => {
                debug!("event receiver dropped, stopping WebSocket loop");
                break;
            }
            Ok(Disconnect::Cancelled) => break,
            Err(e) => warn!(error = %e, "WebSocket error"),
        }

        if !transition(&ctx.state, StreamState::Reconnecting) {
            break;
        }

        let delay = ctx.config.reconnect_interval;
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    debug!("WebSocket loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single connection and read frames until it drops.
async fn connect_and_read(ctx: &LoopContext) -> Result<Disconnect, Error> {
    info!(url = %ctx.url, "Connecting to WebSocket");

    let request = build_request(&ctx.url, &ctx.session_id)?;

    let connected = tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => return Ok(Disconnect::Cancelled),
        result = tokio_tungstenite::connect_async(request) => result,
    };
    let (ws_stream, _response) = connected.map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    transition(&ctx.state, StreamState::Connected);
    info!("WebSocket connected");

    let (mut write, mut read) = ws_stream.split();

    let ping_every = ctx.config.ping_interval;
    let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + ping_every, ping_every);

    loop {
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {
                match tokio::time::timeout(CLOSE_TIMEOUT, write.send(Message::Close(None))).await {
                    Ok(Ok(())) => debug!("WebSocket close frame sent"),
                    Ok(Err(e)) => debug!(error = %e, "WebSocket close failed"),
                    Err(_) => debug!("WebSocket close timed out"),
                }
                return Ok(Disconnect::Cancelled);
            }
            _ = ping.tick() => {
                write
                    .send(Message::Ping(Vec::new().into()))
                    .await
                    .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
                trace!("WebSocket ping sent");
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if !deliver(ctx, &text).await {
                            return Ok(Disconnect::ConsumerGone);
                        }
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite replies with a pong on the next write/flush
                        trace!("WebSocket ping received");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "WebSocket close frame received"
                            );
                        } else {
                            info!("WebSocket close frame received (no payload)");
                        }
                        return Ok(Disconnect::Remote);
                    }
                    Some(Err(e)) => {
                        return Err(Error::WebSocketConnect(e.to_string()));
                    }
                    None => {
                        info!("WebSocket stream ended");
                        return Ok(Disconnect::Remote);
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }
}

/// Build the upgrade request with the session header.
fn build_request(url: &Url, session_id: &str) -> Result<ClientRequestBuilder, Error> {
    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    Ok(ClientRequestBuilder::new(uri)
        .with_header("Websocket-Id", session_id)
        .with_header("User-Agent", USER_AGENT))
}

// ── Delivery ─────────────────────────────────────────────────────────

/// Parse a text frame and hand it to the consumer.
///
/// Unparseable frames are dropped. Returns `false` only when the receiver
/// is gone; a cancellation mid-send returns `true` so the read loop can run
/// its close path.
async fn deliver(ctx: &LoopContext, text: &str) -> bool {
    let msg = match IncomingMessage::parse(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(error = %e, "Dropping unparseable WebSocket frame");
            return true;
        }
    };

    transition(&ctx.state, StreamState::Streaming);

    tokio::select! {
        biased;
        () = ctx.cancel.cancelled() => true,
        sent = ctx.events.send(msg) => sent.is_ok(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
