// depotsync-core: client lifecycle and import-session synchronization on top of depotsync-api.

pub mod client;
pub mod config;
pub mod error;
pub mod import;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{Client, Subscription};
pub use config::{ClientConfig, SyncConfig};
pub use error::CoreError;
pub use import::{
    IdContext, ImportEventType, ImportSessionSync, ImportStep, SessionMode, SessionState,
    SessionTransport, SocketSessions, SyncHandle, WizardSignal,
};

// Wire-layer types consumers need without depending on depotsync-api directly.
pub use depotsync_api::{
    ConnectionState, Handler, InboundMessage, JobHandle, JobKind, JobStatus, PollConfig,
    ReconnectConfig, SocketConfig, SocketHandle, TlsMode,
};
