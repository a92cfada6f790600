//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use depotsync_config::ConfigError;
use depotsync_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {url}")]
    #[diagnostic(
        code(depotsync::connection_failed),
        help(
            "Check that the backend is running and reachable.\n\
             Use --insecure (-k) for self-signed certificates."
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Connection closed before the exchange completed")]
    #[diagnostic(code(depotsync::disconnected))]
    Disconnected,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(depotsync::auth_failed),
        help(
            "Verify your token.\n\
             Store one with: depotsync config set-token --token <TOKEN>\n\
             Or set DEPOTSYNC_TOKEN."
        )
    )]
    AuthFailed { message: String },

    // ── Exchanges ────────────────────────────────────────────────────
    #[error("Server rejected the request")]
    #[diagnostic(code(depotsync::rejected), help("Server response:\n{body}"))]
    Rejected { body: String },

    #[error("No reply to request {request_id} within {seconds}s")]
    #[diagnostic(
        code(depotsync::request_timeout),
        help("Raise request_timeout_secs in your profile, or retry.")
    )]
    RequestTimeout { request_id: String, seconds: u64 },

    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(depotsync::timeout),
        help("Increase timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Jobs ─────────────────────────────────────────────────────────
    #[error("Job kind '{name}' not found")]
    #[diagnostic(
        code(depotsync::unknown_job_kind),
        help("Run: depotsync job kinds\nOr define it under [profiles.<name>.jobs.{name}].")
    )]
    UnknownJobKind { name: String },

    #[error("Job did not finish after {attempts} polls")]
    #[diagnostic(
        code(depotsync::job_incomplete),
        help("Raise max_attempts for this kind under [profiles.<name>.jobs.<kind>].")
    )]
    JobIncomplete { attempts: u32 },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({code}): {message}")]
    #[diagnostic(code(depotsync::api_error))]
    ApiError { code: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(depotsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(depotsync::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: depotsync --socket-url <URL> --api-url <URL> config init --name {name}"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(depotsync::no_config),
        help(
            "Create one with: depotsync --socket-url <URL> --api-url <URL> config init\n\
             Or pass --socket-url and --api-url directly.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(depotsync::config))]
    Config(ConfigError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(depotsync::json), help("Check the JSON input and try again."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Disconnected => exit_code::CONNECTION,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::UnknownJobKind { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::NOT_FOUND
            }
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::RequestTimeout { .. } | Self::Timeout { .. } | Self::JobIncomplete { .. } => {
                exit_code::TIMEOUT
            }
            Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => CliError::ConnectionFailed {
                url,
                source: reason.into(),
            },
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::Disconnected => CliError::Disconnected,
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::RequestTimeout {
                request_id,
                timeout_secs,
            } => CliError::RequestTimeout {
                request_id,
                seconds: timeout_secs,
            },
            CoreError::Rejected { body } => CliError::Rejected {
                body: serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string()),
            },
            CoreError::InvalidPayload { message } => CliError::Validation {
                field: "payload".into(),
                reason: message,
            },
            CoreError::UnknownJobKind { name } => CliError::UnknownJobKind { name },
            CoreError::JobIncomplete { attempts } => CliError::JobIncomplete { attempts },
            CoreError::Api { message, status } => CliError::ApiError {
                code: status.map_or_else(|| "api".into(), |s| s.to_string()),
                message,
            },
            CoreError::Protocol { message } => CliError::ApiError {
                code: "protocol".into(),
                message,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::ApiError {
                code: "internal".into(),
                message,
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(other),
        }
    }
}
