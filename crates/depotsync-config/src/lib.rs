//! Configuration for the depotsync CLI.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to `depotsync_core::ClientConfig`. The CLI adds flag-aware
//! wrappers on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use depotsync_core::{
    ClientConfig, JobKind, JobStatus, PollConfig, ReconnectConfig, SocketConfig, SyncConfig,
    TlsMode,
};

/// Keyring service name; entries are keyed `<profile>/token`.
pub const KEYRING_SERVICE: &str = "depotsync";

/// Last-resort environment variable for the credential.
pub const TOKEN_ENV: &str = "DEPOTSYNC_TOKEN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// The named profile, or the default one when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, p)| (k.as_str(), p))
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Output format: "pretty" or "json".
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub insecure: bool,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "pretty".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named backend profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Socket endpoint (e.g., "wss://api.example.com/ws").
    pub socket_url: String,

    /// HTTP API root for job endpoints.
    pub api_url: String,

    /// Token (plaintext, prefer keyring or env var).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable name containing the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insecure: Option<bool>,

    /// Override HTTP timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_retry_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_window_ms: Option<u64>,

    /// Reply `type` marking a declared error response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    /// Request `type` that opens an import session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_session_type: Option<String>,

    /// Pause after a failed session creation, in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_retry_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<ReconnectSettings>,

    /// Per-kind poll overrides, keyed by job kind name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub jobs: HashMap<String, JobOverride>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ReconnectSettings {
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

/// Overrides for one job kind. Unknown names define new kinds.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct JobOverride {
    pub path: Option<String>,
    pub interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    /// Statuses that end polling, e.g. `["done", "insufficient_data"]`.
    pub terminal: Option<Vec<String>>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "depotsync", "depotsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("depotsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` + `DEPOTSYNC_` environment variables.
///
/// Nested keys use a double underscore, e.g.
/// `DEPOTSYNC_PROFILES__DEFAULT__SOCKET_URL`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DEPOTSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the token: `token_env` → keyring → plaintext → `DEPOTSYNC_TOKEN`.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(
        profile,
        profile_name,
        |name| std::env::var(name).ok(),
        |profile_name| {
            keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
                .and_then(|entry| entry.get_password())
                .ok()
        },
    )
}

/// The resolution chain with injectable env and keyring lookups.
pub fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(secret) = profile.token_env.as_deref().and_then(&env) {
        return Ok(SecretString::from(secret));
    }

    // 2. System keyring
    if let Some(secret) = keyring(profile_name) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    // 4. Global env var
    if let Some(secret) = env(TOKEN_ENV) {
        return Ok(SecretString::from(secret));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))?;
    entry.set_password(token)?;
    Ok(())
}

// ── Profile → ClientConfig ──────────────────────────────────────────

fn parse_url(field: &str, value: &str) -> Result<url::Url, ConfigError> {
    value.parse().map_err(|e| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{value}': {e}"),
    })
}

fn reconnect_config(settings: Option<&ReconnectSettings>) -> ReconnectConfig {
    let mut reconnect = ReconnectConfig::default();
    if let Some(s) = settings {
        if let Some(ms) = s.initial_delay_ms {
            reconnect.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = s.max_delay_ms {
            reconnect.max_delay = Duration::from_millis(ms);
        }
        if s.max_retries.is_some() {
            reconnect.max_retries = s.max_retries;
        }
    }
    reconnect
}

/// Presets with the profile's overrides applied. Unknown names add a kind.
pub fn job_kinds(overrides: &HashMap<String, JobOverride>) -> Result<Vec<JobKind>, ConfigError> {
    let mut kinds = JobKind::presets();

    let mut names: Vec<&String> = overrides.keys().collect();
    names.sort();
    for name in names {
        let o = &overrides[name];
        let idx = match kinds.iter().position(|k| &k.name == name) {
            Some(idx) => idx,
            None => {
                kinds.push(JobKind::new(
                    name.as_str(),
                    name.as_str(),
                    PollConfig::default(),
                    &[JobStatus::Done],
                ));
                kinds.len() - 1
            }
        };
        let kind = &mut kinds[idx];

        if let Some(ref path) = o.path {
            kind.path.clone_from(path);
        }
        if let Some(ms) = o.interval_ms {
            kind.poll.interval = Duration::from_millis(ms);
        }
        if let Some(max) = o.max_attempts {
            if max == 0 {
                return Err(ConfigError::Validation {
                    field: format!("jobs.{name}.max_attempts"),
                    reason: "must be at least 1".into(),
                });
            }
            kind.poll.max_attempts = max;
        }
        if let Some(ref terminal) = o.terminal {
            kind.terminal = terminal
                .iter()
                .map(|s| {
                    s.parse::<JobStatus>().map_err(|reason| ConfigError::Validation {
                        field: format!("jobs.{name}.terminal"),
                        reason,
                    })
                })
                .collect::<Result<_, _>>()?;
        }
    }
    Ok(kinds)
}

/// Build a `ClientConfig` from a profile. A missing credential is not an
/// error; the client then connects without one.
pub fn profile_to_client_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let socket_url = parse_url("socket_url", &profile.socket_url)?;
    let api_url = parse_url("api_url", &profile.api_url)?;

    let token = match resolve_token(profile, profile_name) {
        Ok(token) => Some(token),
        Err(ConfigError::NoCredentials { .. }) => None,
        Err(e) => return Err(e),
    };

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    Ok(ClientConfig {
        socket_url,
        api_url,
        token,
        tls,
        http_timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        socket: socket_config(profile),
        jobs: job_kinds(&profile.jobs)?,
        sync: sync_config(profile),
    })
}

fn socket_config(profile: &Profile) -> SocketConfig {
    let base = SocketConfig::default();
    SocketConfig {
        request_timeout: profile
            .request_timeout_secs
            .map_or(base.request_timeout, Duration::from_secs),
        send_retry_interval: profile
            .send_retry_ms
            .map_or(base.send_retry_interval, Duration::from_millis),
        connect_timeout: profile
            .connect_timeout_secs
            .map_or(base.connect_timeout, Duration::from_secs),
        error_type: profile.error_type.clone().unwrap_or(base.error_type),
        reconnect: reconnect_config(profile.reconnect.as_ref()),
    }
}

fn sync_config(profile: &Profile) -> SyncConfig {
    let base = SyncConfig::default();
    SyncConfig {
        dedup_window: profile
            .dedup_window_ms
            .map_or(base.dedup_window, Duration::from_millis),
        create_session_type: profile
            .create_session_type
            .clone()
            .unwrap_or(base.create_session_type),
        create_retry: profile
            .create_retry_ms
            .map_or(base.create_retry, Duration::from_millis),
    }
}
