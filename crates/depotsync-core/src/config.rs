// ── Runtime client configuration ──
//
// These types describe how to reach the depotsync backend. They carry the
// credential and connection tuning but never touch disk; the CLI builds a
// `ClientConfig` from a profile and hands it in.

use std::time::Duration;

use depotsync_api::{JobKind, SocketConfig, TlsMode};
use secrecy::SecretString;
use url::Url;

/// Request type sent to open a new import session.
pub const CREATE_SESSION_TYPE: &str = "create_import_session";

/// Tuning for import-session event synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Identical frames inside this window are sent once.
    pub dedup_window: Duration,
    /// `type` of the request that creates a session.
    pub create_session_type: String,
    /// Pause after a failed session creation before the next attempt.
    pub create_retry: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_millis(250),
            create_session_type: CREATE_SESSION_TYPE.to_owned(),
            create_retry: Duration::from_secs(5),
        }
    }
}

/// Configuration for one backend.
///
/// Built by the CLI, passed to [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Socket endpoint (e.g. `wss://api.example.com/ws`).
    pub socket_url: Url,
    /// HTTP API root for job endpoints.
    pub api_url: Url,
    /// Opaque bearer credential for both channels.
    pub token: Option<SecretString>,
    pub tls: TlsMode,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    pub socket: SocketConfig,
    /// Job kinds known to this client, presets merged with overrides.
    pub jobs: Vec<JobKind>,
    pub sync: SyncConfig,
}

impl ClientConfig {
    /// Defaults for everything but the endpoints.
    pub fn new(socket_url: Url, api_url: Url) -> Self {
        Self {
            socket_url,
            api_url,
            token: None,
            tls: TlsMode::System,
            http_timeout: Duration::from_secs(30),
            socket: SocketConfig::default(),
            jobs: JobKind::presets(),
            sync: SyncConfig::default(),
        }
    }

    pub fn job_kind(&self, name: &str) -> Option<&JobKind> {
        self.jobs.iter().find(|k| k.name == name)
    }
}
