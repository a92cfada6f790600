//! Shared socket with request/response correlation and auto-reconnect.
//!
//! A [`SocketHandle`] owns one logical duplex channel to a fixed endpoint.
//! Many logical exchanges share it:
//!
//! - [`request`](SocketHandle::request) tags a payload with a fresh id and
//!   waits for the first inbound message echoing that id (or a timeout).
//! - [`send`](SocketHandle::send) is fire-and-forget; if the socket is not
//!   open yet the frame is retried on a fixed interval until it is.
//! - [`add_listener`](SocketHandle::add_listener) subscribes to inbound
//!   messages by id, by `type`, or all of them.
//!
//! Reconnection uses exponential backoff with jitter and is invisible to
//! callers except as delayed replies.
//!
//! # Example
//!
//! ```rust,ignore
//! use depotsync_api::websocket::{SocketConfig, SocketHandle, WsConnector};
//!
//! let connector = WsConnector::new("wss://api.example.com/ws".parse()?, None);
//! let socket = SocketHandle::new(connector, SocketConfig::default());
//! socket.connect().await?;
//!
//! let reply = socket.request(&serde_json::json!({ "type": "get_portfolio" })).await?;
//! println!("{}", reply.body());
//!
//! socket.disconnect().await;
//! ```

mod connector;
mod listeners;
pub mod memory;
mod message;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

pub use connector::{Channel, Connector, Frame, FrameSink, FrameStream, WsConnector};
pub use listeners::{Handler, ListenerRegistry};
pub use message::{InboundMessage, Reply};

use crate::error::Error;

// ── ConnectionState ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── SocketConfig ─────────────────────────────────────────────────────

/// Tuning for a [`SocketHandle`].
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// How long `request()` waits for a matching reply. Default: 90s.
    pub request_timeout: Duration,

    /// Retry interval for frames sent while the socket is not open. Default: 500ms.
    pub send_retry_interval: Duration,

    /// Upper bound on how long `connect()` waits for the first open. Default: 30s.
    pub connect_timeout: Duration,

    /// Reply `type` that marks a declared error response. Default: `"error"`.
    pub error_type: String,

    pub reconnect: ReconnectConfig,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(90),
            send_retry_interval: Duration::from_millis(500),
            connect_timeout: Duration::from_secs(30),
            error_type: "error".into(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// ── SocketHandle ─────────────────────────────────────────────────────

/// Handle to the shared socket.
///
/// Cheaply cloneable. Construct once and pass clones to every consumer.
/// Dropping the last clone stops the connection task and abandons any
/// queued sends.
#[derive(Clone)]
pub struct SocketHandle {
    inner: Arc<SocketInner>,
}

struct SocketInner {
    connector: Arc<dyn Connector>,
    config: SocketConfig,
    shared: Arc<Shared>,
    connection: Mutex<Option<ConnectionTask>>,
}

struct ConnectionTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// State touched by the connection task and queued sends.
struct Shared {
    listeners: ListenerRegistry,
    state: watch::Sender<ConnectionState>,
    writer: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Cancelled on disconnect; queued sends never outlive it.
    queued: Mutex<CancellationToken>,
}

impl SocketHandle {
    pub fn new(connector: impl Connector, config: SocketConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        Self {
            inner: Arc::new(SocketInner {
                connector: Arc::new(connector),
                config,
                shared: Arc::new(Shared {
                    listeners: ListenerRegistry::new(),
                    state,
                    writer: Mutex::new(None),
                    queued: Mutex::new(CancellationToken::new()),
                }),
                connection: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.shared.state.borrow()
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.shared.listeners
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Open the socket.
    ///
    /// Returns immediately if a connection is already open or being
    /// established. Otherwise spawns the connection task and waits until
    /// the first open, bounded by [`SocketConfig::connect_timeout`]. On
    /// timeout the task keeps trying in the background.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut state_rx = {
            let mut slot = lock(&self.inner.connection);
            if let Some(task) = slot.as_ref() {
                if !task.handle.is_finished()
                    && matches!(self.state(), ConnectionState::Open | ConnectionState::Connecting)
                {
                    debug!(state = ?self.state(), "socket already connected or connecting");
                    return Ok(());
                }
            }
            if let Some(stale) = slot.take() {
                stale.cancel.cancel();
            }

            self.inner.shared.set_state(ConnectionState::Connecting);
            let state_rx = self.inner.shared.state.subscribe();

            let cancel = CancellationToken::new();
            let handle = tokio::spawn(connection_loop(
                Arc::clone(&self.inner.connector),
                Arc::clone(&self.inner.shared),
                self.inner.config.reconnect.clone(),
                cancel.clone(),
            ));
            *slot = Some(ConnectionTask { cancel, handle });
            state_rx
        };

        let timeout = self.inner.config.connect_timeout;
        let reached = tokio::time::timeout(
            timeout,
            state_rx.wait_for(|s| matches!(s, ConnectionState::Open | ConnectionState::Closed)),
        )
        .await
        .map_err(|_| Error::Timeout {
            timeout_secs: timeout.as_secs(),
        })?
        .map(|state| *state)
        .map_err(|_| Error::ConnectionClosed)?;

        match reached {
            ConnectionState::Open => Ok(()),
            _ => Err(Error::WebSocketConnect("reconnection limit reached".into())),
        }
    }

    /// Close the socket, drop every listener and fail in-flight requests.
    /// Sends still waiting for an open socket are discarded.
    ///
    /// Safe to call when not connected.
    pub async fn disconnect(&self) {
        self.inner.shared.abandon_queued_sends();

        let task = lock(&self.inner.connection).take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                warn!(error = %e, "connection task ended abnormally");
            }
        }

        // Pending requests hold their reply channel only through the
        // registry, so clearing it wakes them with `ConnectionClosed`.
        self.inner.shared.listeners.clear();
        self.inner.shared.detach_writer();
        self.inner.shared.set_state(ConnectionState::Closed);
        debug!("socket disconnected");
    }

    // ── Sending ──────────────────────────────────────────────────

    /// Fire-and-forget send.
    ///
    /// Never fails because the socket is closed: the frame is retried every
    /// [`SocketConfig::send_retry_interval`] until the socket is open, or
    /// dropped by [`disconnect`](Self::disconnect).
    /// Frames queued this way may overtake or be overtaken by later sends.
    pub fn send(&self, payload: &impl Serialize) -> Result<(), Error> {
        let frame = serde_json::to_string(payload)?;
        Shared::send_or_retry(&self.inner.shared, frame, self.inner.config.send_retry_interval);
        Ok(())
    }

    /// Send `{ ...payload, id }` and wait for the first reply carrying `id`.
    ///
    /// Settles exactly once: with the reply, with
    /// [`Error::ErrorResponse`] if the reply's `type` is the configured error
    /// type, with [`Error::RequestTimeout`], or with
    /// [`Error::ConnectionClosed`] if the handle is disconnected first.
    pub async fn request(&self, payload: &impl Serialize) -> Result<InboundMessage, Error> {
        let mut frame = message::to_object(payload)?;
        let request_id = Uuid::new_v4().to_string();
        frame.insert("id".into(), Value::String(request_id.clone()));

        let (tx, rx) = oneshot::channel::<InboundMessage>();
        let slot = Mutex::new(Some(tx));
        let handler: Handler = Arc::new(move |msg: &InboundMessage| {
            if let Some(tx) = lock(&slot).take() {
                let _ = tx.send(msg.clone());
            }
        });

        let listeners = &self.inner.shared.listeners;
        let handler = listeners.add_listener(Some(request_id.clone()), None, handler);
        let _guard = ListenerGuard {
            registry: listeners,
            handler: Arc::downgrade(&handler),
        };
        drop(handler);

        debug!(request_id = %request_id, "sending request");
        self.send(&Value::Object(frame))?;

        let timeout = self.inner.config.request_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => {
                trace!(request_id = %request_id, "request settled");
                Reply::decode(reply, &self.inner.config.error_type).into_result()
            }
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                warn!(request_id = %request_id, timeout_secs = timeout.as_secs(), "request timed out");
                Err(Error::RequestTimeout {
                    request_id,
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    // ── Listeners ────────────────────────────────────────────────

    /// Register a persistent listener. See [`ListenerRegistry::add_listener`].
    pub fn add_listener(
        &self,
        id: Option<String>,
        kind: Option<String>,
        handler: Handler,
    ) -> Handler {
        self.inner.shared.listeners.add_listener(id, kind, handler)
    }

    pub fn remove_listener(&self, handler: &Handler) -> usize {
        self.inner.shared.listeners.remove_listener(handler)
    }
}

impl Drop for SocketInner {
    fn drop(&mut self) {
        let slot = self
            .connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = slot.take() {
            task.cancel.cancel();
        }
    }
}

/// Removes a request's listener when the request settles or is dropped.
struct ListenerGuard<'a> {
    registry: &'a ListenerRegistry,
    handler: Weak<dyn Fn(&InboundMessage) + Send + Sync>,
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.upgrade() {
            self.registry.remove_listener(&handler);
        }
    }
}

// ── Shared ───────────────────────────────────────────────────────────

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn attach_writer(&self, writer: mpsc::UnboundedSender<String>) {
        *lock(&self.writer) = Some(writer);
    }

    fn detach_writer(&self) {
        *lock(&self.writer) = None;
    }

    fn abandon_queued_sends(&self) {
        let previous = std::mem::take(&mut *lock(&self.queued));
        previous.cancel();
    }

    /// Hand the frame to the live connection, or give it back.
    fn try_send(&self, frame: String) -> Result<(), String> {
        if *self.state.borrow() != ConnectionState::Open {
            return Err(frame);
        }
        match lock(&self.writer).as_ref() {
            Some(writer) => writer.send(frame).map_err(|e| e.0),
            None => Err(frame),
        }
    }

    fn send_or_retry(this: &Arc<Self>, frame: String, interval: Duration) {
        let Err(frame) = this.try_send(frame) else {
            return;
        };

        debug!(
            retry_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "socket not open, queueing send"
        );
        let weak = Arc::downgrade(this);
        let abandoned = lock(&this.queued).clone();
        tokio::spawn(async move {
            let mut frame = frame;
            loop {
                tokio::select! {
                    biased;
                    () = abandoned.cancelled() => {
                        debug!("socket disconnected, abandoning queued send");
                        return;
                    }
                    () = tokio::time::sleep(interval) => {}
                }
                let Some(shared) = weak.upgrade() else {
                    debug!("socket handle dropped, abandoning queued send");
                    return;
                };
                match shared.try_send(frame) {
                    Ok(()) => {
                        trace!("queued send delivered");
                        return;
                    }
                    Err(f) => frame = f,
                }
            }
        });
    }
}

// ── Background connection loop ───────────────────────────────────────

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_GOING_AWAY: u16 = 1001;

/// Main loop: connect → serve → on error, backoff → reconnect.
async fn connection_loop(
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    while !cancel.is_cancelled() {
        shared.set_state(ConnectionState::Connecting);

        match connect_and_serve(connector.as_ref(), &shared, &cancel).await {
            // Clean disconnect (normal close frame or stream ended).
            // Reset attempt counter and reconnect immediately.
            Ok(()) => {
                if !cancel.is_cancelled() {
                    info!("WebSocket disconnected cleanly, reconnecting");
                }
                attempt = 0;
            }
            Err(e) => {
                warn!(error = %e, attempt, "WebSocket error");

                if let Some(max) = reconnect.max_retries {
                    if attempt >= max {
                        tracing::error!(
                            max_retries = max,
                            "WebSocket reconnection limit reached, giving up"
                        );
                        break;
                    }
                }

                let delay = calculate_backoff(attempt, &reconnect);
                info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt,
                    "Waiting before reconnect"
                );

                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }

                attempt += 1;
            }
        }
    }

    shared.detach_writer();
    shared.set_state(ConnectionState::Closed);
    debug!("WebSocket loop exiting");
}

/// Open one channel and pump it until it drops or the task is cancelled.
async fn connect_and_serve(
    connector: &dyn Connector,
    shared: &Shared,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let Channel {
        mut sink,
        mut stream,
    } = tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        channel = connector.connect() => channel?,
    };

    let (writer, mut outbound) = mpsc::unbounded_channel::<String>();
    shared.attach_writer(writer);
    shared.set_state(ConnectionState::Open);
    info!("WebSocket connected");

    let result = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Frames already accepted by this connection go out before the close.
                while let Ok(text) = outbound.try_recv() {
                    if let Err(e) = sink.send(text).await {
                        debug!(error = %e, "dropping unsent frames on disconnect");
                        break;
                    }
                }
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "error closing WebSocket");
                }
                break Ok(());
            }
            Some(text) = outbound.recv() => {
                if let Err(e) = sink.send(text).await {
                    break Err(e);
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Frame::Text(text))) => {
                    shared.listeners.dispatch_text(&text);
                }
                Some(Ok(Frame::Close { code, reason })) => {
                    info!(code, reason = %reason, "WebSocket close frame received");
                    if matches!(code, CLOSE_NORMAL | CLOSE_GOING_AWAY) {
                        break Ok(());
                    }
                    break Err(Error::WebSocketClosed { code, reason });
                }
                Some(Err(e)) => break Err(e),
                None => {
                    info!("WebSocket stream ended");
                    break Ok(());
                }
            },
        }
    };

    shared.detach_writer();
    if !cancel.is_cancelled() {
        shared.set_state(ConnectionState::Connecting);
    }
    result
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`
///
/// Jitter is +-25% to spread out reconnection storms from multiple clients.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_socket_config() {
        let config = SocketConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        assert_eq!(config.send_retry_interval, Duration::from_millis(500));
        assert_eq!(config.error_type, "error");
        assert!(config.reconnect.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        // With jitter factor up to 1.25, max effective is 12.5s
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
        // Huge attempt counts must not overflow.
        assert!(calculate_backoff(u32::MAX, &config) <= Duration::from_secs(13));
    }

    #[tokio::test]
    async fn disconnect_without_connection_is_noop() {
        let (connector, _server) = memory::pair();
        let socket = SocketHandle::new(connector, SocketConfig::default());

        socket.disconnect().await;
        assert_eq!(socket.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn request_rejects_non_object_payload() {
        let (connector, _server) = memory::pair();
        let socket = SocketHandle::new(connector, SocketConfig::default());

        let err = socket.request(&"ping").await.unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));
        assert!(socket.listeners().is_empty());
    }
}
