// Seam between the synchronizer and the socket.

use futures::future::BoxFuture;
use serde_json::{Value, json};
use tracing::debug;

use depotsync_api::SocketHandle;

use crate::error::CoreError;

/// What the synchronizer needs from the outside world.
pub trait SessionTransport: Send + Sync {
    /// Open a new import session and return its id.
    fn create_session(&self) -> BoxFuture<'_, Result<String, CoreError>>;

    /// Send one event frame, fire-and-forget.
    fn emit(&self, frame: &Value) -> Result<(), CoreError>;
}

/// [`SessionTransport`] over the shared socket.
///
/// Sessions are opened with a correlated request whose reply carries
/// `session_id`, either at the top level or under `data`.
#[derive(Clone)]
pub struct SocketSessions {
    socket: SocketHandle,
    create_type: String,
}

impl SocketSessions {
    pub fn new(socket: SocketHandle, create_type: impl Into<String>) -> Self {
        Self {
            socket,
            create_type: create_type.into(),
        }
    }
}

impl SessionTransport for SocketSessions {
    fn create_session(&self) -> BoxFuture<'_, Result<String, CoreError>> {
        Box::pin(async move {
            let reply = self
                .socket
                .request(&json!({ "type": self.create_type }))
                .await?;
            let body = reply.body();
            let id = body
                .get("session_id")
                .or_else(|| body.get("data").and_then(|d| d.get("session_id")))
                .and_then(Value::as_str)
                .ok_or_else(|| CoreError::Protocol {
                    message: format!("{} reply carries no session_id", self.create_type),
                })?;
            debug!(session_id = id, "import session opened");
            Ok(id.to_owned())
        })
    }

    fn emit(&self, frame: &Value) -> Result<(), CoreError> {
        self.socket.send(frame).map_err(CoreError::from)
    }
}
