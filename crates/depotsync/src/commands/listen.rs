//! `depotsync listen`: print pushes until Ctrl-C, disconnect, or `--count`.

use tracing::debug;

use depotsync_core::Client;

use crate::cli::{GlobalOpts, ListenArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(client: &Client, args: ListenArgs, global: &GlobalOpts) -> Result<(), CliError> {
    client.connect().await?;
    let mut subscription = client.listen(args.kind);

    let mut seen = 0usize;
    let outcome = loop {
        if args.count.is_some_and(|limit| seen >= limit) {
            break Ok(());
        }
        tokio::select! {
            msg = subscription.recv() => {
                let Some(msg) = msg else {
                    break Err(CliError::Disconnected);
                };
                seen += 1;
                if let Err(e) = output::print(&msg, global) {
                    break Err(e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break Ok(());
            }
        }
    };

    drop(subscription);
    client.disconnect().await;
    outcome
}
