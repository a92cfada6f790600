// Job API HTTP client
//
// Wraps `reqwest::Client` with job URL construction and response
// decoding. Polling itself lives in `poll.rs`; this module only knows how
// to start a job and read its status once.

use serde::Serialize;
use tracing::debug;
use url::Url;

use super::{JobHandle, JobKind, poll_request};
use crate::error::Error;
use crate::transport::TransportConfig;

/// HTTP client for the asynchronous job API.
pub struct JobClient {
    http: reqwest::Client,
    base_url: Url,
}

impl JobClient {
    /// Create a job client from a `TransportConfig`.
    ///
    /// The `base_url` is the API root, e.g. `https://api.example.com/v1`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a job client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// `{base}/{kind.path}` or `{base}/{kind.path}/{id}`.
    pub(crate) fn job_url(&self, kind: &JobKind, id: Option<&str>) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = kind.path.trim_matches('/');
        let full = match id {
            Some(id) => format!("{base}/{path}/{id}"),
            None => format!("{base}/{path}"),
        };
        Ok(Url::parse(&full)?)
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Start a job: `POST {base}/{kind.path}`.
    pub async fn create_job(
        &self,
        kind: &JobKind,
        body: &impl Serialize,
    ) -> Result<JobHandle, Error> {
        let url = self.job_url(kind, None)?;
        debug!(job = %kind.name, "POST {}", url);

        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_response(resp).await
    }

    /// Read a job's status once: `GET {base}/{kind.path}/{id}`.
    pub async fn job_status(
        &self,
        kind: &JobKind,
        id: &str,
        query: &[(&str, &str)],
    ) -> Result<JobHandle, Error> {
        let url = self.job_url(kind, Some(id))?;
        debug!(job = %kind.name, job_id = id, "GET {}", url);

        let resp = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_response(resp).await
    }

    /// Start a job and poll it until terminal, per `kind.poll`.
    ///
    /// If the creation response already carries a terminal status it is
    /// returned directly without polling.
    pub async fn run_job(
        &self,
        kind: &JobKind,
        body: &impl Serialize,
        query: &[(&str, &str)],
    ) -> Result<JobHandle, Error> {
        let created = self.create_job(kind, body).await?;
        if kind.is_terminal(created.status) {
            debug!(job = %kind.name, status = created.status.as_str(), "job finished on creation");
            return Ok(created);
        }

        let Some(id) = created.id else {
            return Err(Error::Deserialization {
                message: format!(
                    "{} creation returned neither an id nor a terminal status",
                    kind.name
                ),
                body: serde_json::to_string(&created.payload).unwrap_or_default(),
            });
        };

        let job_id = id.as_str();
        let result = poll_request(
            || self.job_status(kind, job_id, query),
            |handle: &JobHandle| kind.is_terminal(handle.status),
            kind.poll.interval,
            kind.poll.max_attempts,
        )
        .await?;

        debug!(job = %kind.name, job_id = %id, status = result.status.as_str(), "job finished");
        Ok(result)
    }
}

/// Decode a job API response, mapping HTTP failures to errors.
async fn parse_response(resp: reqwest::Response) -> Result<JobHandle, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::Authentication {
            message: "token expired or invalid".into(),
        });
    }

    let body = resp.text().await.map_err(Error::Transport)?;

    if !status.is_success() {
        return Err(Error::Api {
            status: status.as_u16(),
            message: if body.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_owned()
            } else {
                body
            },
        });
    }

    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobStatus, PollConfig};

    #[test]
    fn job_url_joins_without_double_slashes() {
        let client = JobClient::with_client(
            reqwest::Client::new(),
            Url::parse("https://api.example.com/v1/").unwrap(),
        );
        let kind = JobKind::new("sim", "/simulation/", PollConfig::default(), &[JobStatus::Done]);

        assert_eq!(
            client.job_url(&kind, None).unwrap().as_str(),
            "https://api.example.com/v1/simulation"
        );
        assert_eq!(
            client.job_url(&kind, Some("42")).unwrap().as_str(),
            "https://api.example.com/v1/simulation/42"
        );
    }
}
