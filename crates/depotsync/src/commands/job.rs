//! `depotsync job`: start, poll, and inspect long-running jobs.

use serde::Serialize;
use serde_json::{Map, Value};

use depotsync_core::Client;

use crate::cli::{GlobalOpts, JobArgs, JobCommand};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct KindRow<'a> {
    name: &'a str,
    path: &'a str,
    interval_ms: u64,
    max_attempts: u32,
    terminal: Vec<&'static str>,
}

fn query_refs(query: &[(String, String)]) -> Vec<(&str, &str)> {
    query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

pub async fn handle(client: &Client, args: JobArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        JobCommand::Run { kind, body, query } => {
            let body = match body {
                Some(ref text) => util::parse_object("body", text)?,
                None => Map::new(),
            };
            let handle = client
                .run_job(&kind, &Value::Object(body), &query_refs(&query))
                .await?;
            output::print(&handle, global)
        }

        JobCommand::Status { kind, id, query } => {
            let handle = client.job_status(&kind, &id, &query_refs(&query)).await?;
            output::print(&handle, global)
        }

        JobCommand::Kinds => {
            let mut rows: Vec<KindRow<'_>> = client
                .config()
                .jobs
                .iter()
                .map(|kind| KindRow {
                    name: &kind.name,
                    path: &kind.path,
                    interval_ms: u64::try_from(kind.poll.interval.as_millis()).unwrap_or(u64::MAX),
                    max_attempts: kind.poll.max_attempts,
                    terminal: kind.terminal.iter().map(|s| s.as_str()).collect(),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(b.name));
            output::print(&rows, global)
        }
    }
}
