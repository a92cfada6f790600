//! In-process transport for tests and embedding.
//!
//! [`MemoryConnector`] hands out channel pairs; the matching
//! [`MemoryServer`] accepts the server end of each one as a [`MemoryPeer`].
//! Refusing connections (see [`MemoryServer::set_accepting`]) exercises the
//! reconnect path without any sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use futures::channel::mpsc as fmpsc;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use super::connector::{Channel, Connector, Frame};
use crate::error::Error;

struct Gate {
    accepting: AtomicBool,
    attempts: AtomicU32,
}

/// Client side: plug into [`SocketHandle::new`](super::SocketHandle::new).
pub struct MemoryConnector {
    gate: Arc<Gate>,
    accepted: mpsc::UnboundedSender<MemoryPeer>,
}

/// Server side: accepts peers opened by the paired connector.
pub struct MemoryServer {
    gate: Arc<Gate>,
    accepted: Mutex<mpsc::UnboundedReceiver<MemoryPeer>>,
}

/// Server end of one open channel.
pub struct MemoryPeer {
    from_client: fmpsc::UnboundedReceiver<String>,
    to_client: fmpsc::UnboundedSender<Result<Frame, Error>>,
}

/// Create a connected connector/server pair. The server accepts by default.
pub fn pair() -> (MemoryConnector, MemoryServer) {
    let gate = Arc::new(Gate {
        accepting: AtomicBool::new(true),
        attempts: AtomicU32::new(0),
    });
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            gate: Arc::clone(&gate),
            accepted: tx,
        },
        MemoryServer {
            gate,
            accepted: Mutex::new(rx),
        },
    )
}

impl Connector for MemoryConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Channel, Error>> {
        Box::pin(async move {
            self.gate.attempts.fetch_add(1, Ordering::SeqCst);
            if !self.gate.accepting.load(Ordering::SeqCst) {
                return Err(Error::WebSocketConnect("connection refused".into()));
            }

            let (to_server, from_client) = fmpsc::unbounded::<String>();
            let (to_client, from_server) = fmpsc::unbounded::<Result<Frame, Error>>();

            self.accepted
                .send(MemoryPeer {
                    from_client,
                    to_client,
                })
                .map_err(|_| Error::WebSocketConnect("server dropped".into()))?;

            let sink = to_server.sink_map_err(|e| Error::WebSocketConnect(e.to_string()));
            Ok(Channel {
                sink: Box::pin(sink),
                stream: Box::pin(from_server),
            })
        })
    }
}

impl MemoryServer {
    /// Wait for the next accepted channel.
    pub async fn accept(&self) -> Option<MemoryPeer> {
        self.accepted.lock().await.recv().await
    }

    /// Accept or refuse future connection attempts.
    pub fn set_accepting(&self, accepting: bool) {
        self.gate.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Number of connection attempts seen so far, refused ones included.
    pub fn attempts(&self) -> u32 {
        self.gate.attempts.load(Ordering::SeqCst)
    }
}

impl MemoryPeer {
    /// Next raw frame written by the client.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.next().await
    }

    /// Next frame written by the client, decoded as JSON.
    pub async fn recv_json(&mut self) -> Option<Value> {
        let text = self.recv_text().await?;
        serde_json::from_str(&text).ok()
    }

    /// A frame already written by the client, without waiting.
    pub fn try_recv_text(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Push a raw text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.unbounded_send(Ok(Frame::Text(text.into())));
    }

    /// Push a JSON frame to the client.
    pub fn send_json(&self, value: &Value) {
        self.send_text(value.to_string());
    }

    /// Send a close frame. Codes 1000 and 1001 are a clean disconnect; any
    /// other code makes the client back off before reconnecting.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.unbounded_send(Ok(Frame::Close {
            code,
            reason: reason.into(),
        }));
    }

    /// Fail the channel with a transport error.
    pub fn fail(&self, message: &str) {
        let _ = self
            .to_client
            .unbounded_send(Err(Error::WebSocketConnect(message.into())));
    }
}
