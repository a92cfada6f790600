//! `depotsync request`: one correlated exchange.

use depotsync_core::Client;

use crate::cli::{GlobalOpts, PayloadArgs};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

pub async fn handle(client: &Client, args: PayloadArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let payload = util::read_payload(&args)?;

    client.connect().await?;
    let result = client.request(&payload).await;
    client.disconnect().await;

    output::print(&result?, global)
}
