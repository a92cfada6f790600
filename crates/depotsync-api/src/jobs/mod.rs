//! Long-running server-side jobs over HTTP.
//!
//! Every analytical computation follows the same two-call protocol: a POST
//! starts the job and returns an id (or, for fast jobs, a body that already
//! carries its status); a GET keyed by that id is polled until the job
//! reaches a status its [`JobKind`] considers terminal.

mod client;
mod poll;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use client::JobClient;
pub use poll::{PollConfig, poll_request};

// ── JobStatus ────────────────────────────────────────────────────────

/// Status reported by the job API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Done,
    InsufficientData,
    Error,
    /// Any status this client does not know; never terminal.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::InsufficientData => "insufficient_data",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            "insufficient_data" => Ok(Self::InsufficientData),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "unknown job status '{other}' (expected pending, done, insufficient_data or error)"
            )),
        }
    }
}

// ── JobHandle ────────────────────────────────────────────────────────

/// A job creation or status response.
///
/// Fields beyond `id` and `status` are opaque payload and kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub status: JobStatus,

    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

// ── JobKind ──────────────────────────────────────────────────────────

/// One kind of server-side job: where it lives, how to poll it, and which
/// statuses end polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobKind {
    pub name: String,
    /// Path below the API base URL, e.g. `simulation`.
    pub path: String,
    pub poll: PollConfig,
    pub terminal: Vec<JobStatus>,
}

const DONE: &[JobStatus] = &[JobStatus::Done];
const DONE_OR_INSUFFICIENT: &[JobStatus] = &[JobStatus::Done, JobStatus::InsufficientData];

impl JobKind {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        poll: PollConfig,
        terminal: &[JobStatus],
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            poll,
            terminal: terminal.to_vec(),
        }
    }

    pub fn is_terminal(&self, status: JobStatus) -> bool {
        self.terminal.contains(&status)
    }

    pub fn portfolio_construction() -> Self {
        Self::new(
            "portfolio-construction",
            "portfolio-construction",
            PollConfig::new(Duration::from_secs(1), 60),
            DONE,
        )
    }

    pub fn optimization() -> Self {
        Self::new(
            "optimization",
            "optimization",
            PollConfig::new(Duration::from_secs(1), 60),
            DONE_OR_INSUFFICIENT,
        )
    }

    pub fn simulation() -> Self {
        Self::new(
            "simulation",
            "simulation",
            PollConfig::new(Duration::from_millis(500), 50),
            DONE,
        )
    }

    pub fn correlation_matrix() -> Self {
        Self::new(
            "correlation-matrix",
            "correlation-matrix",
            PollConfig::new(Duration::from_millis(50), 100),
            DONE_OR_INSUFFICIENT,
        )
    }

    pub fn risk_parity() -> Self {
        Self::new(
            "risk-parity",
            "risk-parity",
            PollConfig::new(Duration::from_secs(1), 60),
            DONE_OR_INSUFFICIENT,
        )
    }

    /// Built-in kinds, before any configuration overrides.
    pub fn presets() -> Vec<Self> {
        vec![
            Self::portfolio_construction(),
            Self::optimization(),
            Self::simulation(),
            Self::correlation_matrix(),
            Self::risk_parity(),
        ]
    }
}
