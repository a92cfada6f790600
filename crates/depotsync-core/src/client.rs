// ── Client facade ──
//
// One object per backend: the shared socket, the job client, and the
// import synchronizers built on top of them. Construct once at startup
// and pass clones to every consumer.

use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use depotsync_api::{
    ConnectionState, Handler, InboundMessage, JobClient, JobHandle, JobKind, SocketHandle,
    TransportConfig, WsConnector,
};

use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::import::{ImportSessionSync, SessionMode, SocketSessions};

/// Entry point for consumers.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Does not connect on
/// construction; call [`connect()`](Self::connect).
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    socket: SocketHandle,
    jobs: JobClient,
}

impl Client {
    /// Build a client that talks to the configured endpoints.
    pub fn new(config: ClientConfig) -> Result<Self, CoreError> {
        let connector = WsConnector::new(config.socket_url.clone(), config.token.clone());
        let socket = SocketHandle::new(connector, config.socket.clone());
        Self::with_socket(config, socket)
    }

    /// Build a client over an existing socket handle.
    pub fn with_socket(config: ClientConfig, socket: SocketHandle) -> Result<Self, CoreError> {
        let transport = build_transport(&config);
        let jobs = JobClient::new(config.api_url.clone(), &transport)?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                socket,
                jobs,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn socket(&self) -> &SocketHandle {
        &self.inner.socket
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.socket.state()
    }

    // ── Socket lifecycle ─────────────────────────────────────────

    pub async fn connect(&self) -> Result<(), CoreError> {
        self.inner.socket.connect().await.map_err(|e| match CoreError::from(e) {
            CoreError::ConnectionFailed { reason, .. } => CoreError::ConnectionFailed {
                url: self.inner.config.socket_url.to_string(),
                reason,
            },
            other => other,
        })?;
        info!(url = %self.inner.config.socket_url, "connected");
        Ok(())
    }

    pub async fn disconnect(&self) {
        self.inner.socket.disconnect().await;
    }

    // ── Exchanges ────────────────────────────────────────────────

    /// Correlated request; see [`SocketHandle::request`].
    pub async fn request(&self, payload: &impl Serialize) -> Result<InboundMessage, CoreError> {
        Ok(self.inner.socket.request(payload).await?)
    }

    /// Fire-and-forget send; queued until the socket is open.
    pub fn send(&self, payload: &impl Serialize) -> Result<(), CoreError> {
        Ok(self.inner.socket.send(payload)?)
    }

    /// Subscribe to inbound messages of one `type`, or all of them.
    pub fn listen(&self, kind: Option<String>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: Handler = Arc::new(move |msg: &InboundMessage| {
            let _ = tx.send(msg.clone());
        });
        let handler = self.inner.socket.add_listener(None, kind, handler);
        Subscription {
            socket: self.inner.socket.clone(),
            handler: Arc::downgrade(&handler),
            rx,
        }
    }

    // ── Jobs ─────────────────────────────────────────────────────

    pub fn job_kind(&self, name: &str) -> Result<&JobKind, CoreError> {
        self.inner
            .config
            .job_kind(name)
            .ok_or_else(|| CoreError::UnknownJobKind { name: name.into() })
    }

    /// Start a job of the named kind and poll it until terminal.
    pub async fn run_job(
        &self,
        kind: &str,
        body: &impl Serialize,
        query: &[(&str, &str)],
    ) -> Result<JobHandle, CoreError> {
        let kind = self.job_kind(kind)?;
        debug!(
            job = %kind.name,
            interval_ms = u64::try_from(kind.poll.interval.as_millis()).unwrap_or(u64::MAX),
            max_attempts = kind.poll.max_attempts,
            "running job"
        );
        Ok(self.inner.jobs.run_job(kind, body, query).await?)
    }

    /// Read one job's status without polling.
    pub async fn job_status(
        &self,
        kind: &str,
        id: &str,
        query: &[(&str, &str)],
    ) -> Result<JobHandle, CoreError> {
        let kind = self.job_kind(kind)?;
        Ok(self.inner.jobs.job_status(kind, id, query).await?)
    }

    // ── Import sessions ──────────────────────────────────────────

    /// A synchronizer sending its events over this client's socket.
    pub fn import_session(&self, mode: SessionMode) -> ImportSessionSync<SocketSessions> {
        let sessions = SocketSessions::new(
            self.inner.socket.clone(),
            self.inner.config.sync.create_session_type.clone(),
        );
        ImportSessionSync::new(sessions, mode, &self.inner.config.sync)
    }
}

fn build_transport(config: &ClientConfig) -> TransportConfig {
    TransportConfig {
        tls: config.tls.clone(),
        timeout: config.http_timeout,
        token: config.token.clone(),
    }
}

// ── Subscription ─────────────────────────────────────────────────

/// Inbound messages delivered to a persistent listener.
///
/// The listener is removed when the subscription is dropped.
pub struct Subscription {
    socket: SocketHandle,
    // Weak so that clearing the registry closes the channel.
    handler: Weak<dyn Fn(&InboundMessage) + Send + Sync>,
    rx: mpsc::UnboundedReceiver<InboundMessage>,
}

impl Subscription {
    /// Next message, or `None` once the listener has been cleared by a
    /// disconnect.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.upgrade() {
            self.socket.remove_listener(&handler);
        }
    }
}
