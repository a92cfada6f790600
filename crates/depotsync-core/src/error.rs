// ── Core error types ──
//
// User-facing errors from depotsync-core. Consumers never match on
// reqwest or tungstenite failures directly; the `From<depotsync_api::Error>`
// impl translates wire-layer errors into these variants.

use serde_json::Value;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Connection closed")]
    Disconnected,

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Exchange errors ──────────────────────────────────────────────
    #[error("No response to request {request_id} within {timeout_secs}s")]
    RequestTimeout { request_id: String, timeout_secs: u64 },

    /// The server answered a request with a declared error response.
    #[error("Server rejected the request: {body}")]
    Rejected { body: Value },

    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Job errors ───────────────────────────────────────────────────
    #[error("Unknown job kind '{name}'")]
    UnknownJobKind { name: String },

    #[error("Job did not finish after {attempts} polling attempts")]
    JobIncomplete { attempts: u32 },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The server's error body, if this is a declared error response.
    pub fn rejection(&self) -> Option<&Value> {
        match self {
            Self::Rejected { body } => Some(body),
            _ => None,
        }
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<depotsync_api::Error> for CoreError {
    fn from(err: depotsync_api::Error) -> Self {
        use depotsync_api::Error as Api;

        match err {
            Api::Authentication { message } => CoreError::AuthenticationFailed { message },
            Api::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| u.to_string())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            Api::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            Api::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            Api::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket: {reason}"),
            },
            Api::WebSocketClosed { .. } | Api::ConnectionClosed => CoreError::Disconnected,
            Api::RequestTimeout {
                request_id,
                timeout_secs,
            } => CoreError::RequestTimeout {
                request_id,
                timeout_secs,
            },
            Api::ErrorResponse(message) => CoreError::Rejected {
                body: message.into_body(),
            },
            Api::InvalidPayload(message) => CoreError::InvalidPayload { message },
            Api::PollExhausted { attempts } => CoreError::JobIncomplete { attempts },
            Api::Deserialization { message, .. } => CoreError::Protocol { message },
            Api::Serialization(e) => CoreError::Internal(format!("serialization failed: {e}")),
        }
    }
}
