//! `depotsync import`: replay recorded wizard signals into an import
//! session over the shared socket.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use depotsync_core::{Client, SessionMode, WizardSignal};

use crate::cli::{GlobalOpts, ImportArgs};
use crate::commands::util;
use crate::error::CliError;

/// Signals from a JSON array, or one JSON value per non-empty line.
pub fn parse_signals(text: &str) -> Result<Vec<WizardSignal>, CliError> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|e| CliError::Validation {
            field: "signals".into(),
            reason: e.to_string(),
        });
    }

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| CliError::Validation {
                field: format!("signals line {}", idx + 1),
                reason: e.to_string(),
            })
        })
        .collect()
}

pub async fn handle(client: &Client, args: ImportArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let signals = parse_signals(&util::read_input(&args.file)?)?;
    let mode = match args.session_id {
        Some(session_id) => SessionMode::Background { session_id },
        None => SessionMode::Foreground,
    };

    client.connect().await?;

    let cancel = CancellationToken::new();
    let sync = client.import_session(mode).spawn(cancel.clone());

    let total = signals.len();
    for signal in signals {
        debug!(?signal, "replaying signal");
        sync.signal(signal).await?;
    }
    sync.shutdown().await;
    client.disconnect().await;

    info!(signals = total, "import replay finished");
    if !global.quiet {
        eprintln!("replayed {total} signal(s)");
    }
    Ok(())
}
