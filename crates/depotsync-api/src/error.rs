use thiserror::Error;

use crate::websocket::InboundMessage;

/// Top-level error type for the `depotsync-api` crate.
///
/// Covers every failure mode of the wire layer: the shared socket,
/// request correlation, and the HTTP job protocol.
/// `depotsync-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The credential was rejected (HTTP 401 or a refused upgrade).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// An operation did not complete in time.
    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success HTTP status from the job API.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// The socket handle was disconnected while a request was in flight.
    #[error("Connection closed before a response arrived")]
    ConnectionClosed,

    // ── Correlation ─────────────────────────────────────────────────
    /// No response carrying the request id arrived in time.
    #[error("Request {request_id} timed out after {timeout_secs}s")]
    RequestTimeout { request_id: String, timeout_secs: u64 },

    /// The server answered with a declared error response.
    #[error("Server returned an error response")]
    ErrorResponse(Box<InboundMessage>),

    /// Outbound payload was not a JSON object.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // ── Polling ─────────────────────────────────────────────────────
    /// The job never reached a terminal status within the attempt budget.
    #[error("Job did not finish after {attempts} attempts")]
    PollExhausted { attempts: u32 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// JSON serialization of an outbound message failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. }
            | Self::RequestTimeout { .. }
            | Self::WebSocketConnect(_)
            | Self::WebSocketClosed { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` for any timeout flavour (connect, request, HTTP).
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout(),
            Self::Timeout { .. } | Self::RequestTimeout { .. } => true,
            _ => false,
        }
    }

    /// The full response body of a declared error response, if this is one.
    pub fn error_response(&self) -> Option<&InboundMessage> {
        match self {
            Self::ErrorResponse(msg) => Some(msg),
            _ => None,
        }
    }
}
