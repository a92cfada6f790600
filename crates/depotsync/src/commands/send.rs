//! `depotsync send`: fire-and-forget.

use tracing::info;

use depotsync_core::Client;

use crate::cli::{GlobalOpts, PayloadArgs};
use crate::commands::util;
use crate::error::CliError;

pub async fn handle(client: &Client, args: PayloadArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let payload = util::read_payload(&args)?;

    client.connect().await?;
    client.send(&payload)?;
    // Accepted frames are flushed before the close.
    client.disconnect().await;

    info!("message sent");
    if !global.quiet {
        eprintln!("sent");
    }
    Ok(())
}
